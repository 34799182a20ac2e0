use approx::assert_relative_eq;
use tracing_test::traced_test;

use depth_calib::{
    CalibInfo, Error, IntrinsicSource, calib_info_from_device, extrinsics_report, load_from_png,
    load_json, save_in_png, save_json,
};
use depthcam::{
    Component, DepthCamera, DepthCameraModule, ImageMode, PixelFormat, image_mode_by_index,
    select_device,
};
use depthcam_sim::{SimCamera, SimConfig, SimModule};

fn open(id: &str) -> SimCamera {
    let mut module = depthcam_sim::new_module();
    let infos = module.device_infos().unwrap();
    let info = select_device(&infos, Some(id), None).unwrap();
    module.open(&info).unwrap()
}

#[test]
fn test_factory_calib() {
    let cam = open("SIM-0001");
    let calib = calib_info_from_device(&cam, IntrinsicSource::Factory).unwrap();

    assert_eq!(calib.sn(), "SIM-0001");
    let depth = calib.depth_calib().unwrap();
    assert_eq!((depth.intrinsic_width, depth.intrinsic_height), (1280, 960));
    assert_relative_eq!(depth.intrinsic.fx(), 1040.5);
    assert_relative_eq!(calib.scale_unit(), 0.25);
    assert!(!calib.has_depth_distortion());

    assert!(calib.has_rgb());
    let rgb = calib.rgb_calib().unwrap();
    assert_eq!((rgb.intrinsic_width, rgb.intrinsic_height), (1920, 1080));
    assert_relative_eq!(rgb.extrinsic.data[3], -25.0);
    assert_relative_eq!(rgb.distortion.data[0], 0.101);
}

#[test]
fn test_current_calib_follows_modes() {
    let mut cam = open("SIM-0001");
    let depth_mode = image_mode_by_index(&cam, Component::Depth, 2).unwrap();
    cam.set_image_mode(Component::Depth, depth_mode).unwrap();
    let color_mode = image_mode_by_index(&cam, Component::Color, 1).unwrap();
    cam.set_image_mode(Component::Color, color_mode).unwrap();

    let factory = calib_info_from_device(&cam, IntrinsicSource::Factory).unwrap();
    let current = calib_info_from_device(&cam, IntrinsicSource::Current).unwrap();

    let depth = current.depth_calib().unwrap();
    assert_eq!((depth.intrinsic_width, depth.intrinsic_height), (320, 240));
    assert_relative_eq!(
        depth.intrinsic.fx(),
        factory.depth_calib().unwrap().intrinsic.fx() / 4.0
    );

    let rgb = current.rgb_calib().unwrap();
    assert_eq!(
        ImageMode {
            format: PixelFormat::Yuyv,
            width: rgb.intrinsic_width,
            height: rgb.intrinsic_height
        },
        color_mode
    );
    assert_relative_eq!(
        rgb.intrinsic.cx(),
        factory.rgb_calib().unwrap().intrinsic.cx() * 1280.0 / 1920.0,
        max_relative = 1e-5
    );
    // Extrinsics and distortion are not resolution dependent.
    assert_eq!(rgb.extrinsic, factory.rgb_calib().unwrap().extrinsic);
    assert_eq!(rgb.distortion, factory.rgb_calib().unwrap().distortion);
}

#[test]
fn test_depth_only_device() {
    let cam = open("SIM-0002");
    let calib = calib_info_from_device(&cam, IntrinsicSource::Factory).unwrap();
    assert!(calib.depth_calib().is_some());
    assert!(!calib.has_rgb());
    // no scale unit feature: default kept
    assert_eq!(calib.scale_unit(), 1.0);
}

#[test]
#[traced_test]
fn test_no_depth_sensor_warns() {
    let config = SimConfig::from_toml_str(
        r#"
[[device]]
id = "COLOR-ONLY"
[device.color]
calib_width = 640
calib_height = 480
fx = 600.0
fy = 600.0
cx = 320.0
cy = 240.0
modes = [{ format = "rgb", width = 640, height = 480 }]
"#,
    )
    .unwrap();
    let mut module = SimModule::new(config);
    let infos = module.device_infos().unwrap();
    let cam = module.open(&infos[0]).unwrap();

    let calib = calib_info_from_device(&cam, IntrinsicSource::Current).unwrap();
    assert!(calib.depth_calib().is_none());
    assert!(calib.has_rgb());
    assert!(logs_contain("no depth sensor"));
}

#[test]
fn test_extrinsics_report() {
    let cam = open("SIM-0001");
    let report = extrinsics_report(&cam);
    assert_eq!(report.len(), 7);
    // IR left to depth is not provided by the device.
    let unavailable: Vec<_> = report.iter().filter(|e| e.extrinsic.is_none()).collect();
    assert_eq!(unavailable.len(), 1);
    assert_eq!(unavailable[0].component, Component::IrLeft);

    let cam = open("SIM-0002");
    assert!(extrinsics_report(&cam).iter().all(|e| e.extrinsic.is_none()));
}

fn device_calib() -> CalibInfo {
    let cam = open("SIM-0001");
    let mut calib = calib_info_from_device(&cam, IntrinsicSource::Factory).unwrap();
    calib.set_timestamp("2024-03-05 10:20:30");
    calib
}

#[test]
fn test_json_file_roundtrip() {
    let tmpdir = tempfile::tempdir().unwrap();
    let path = tmpdir.path().join("calib.json");
    let calib = device_calib();
    save_json(&calib, &path).unwrap();
    assert_eq!(load_json(&path).unwrap(), calib);

    assert!(matches!(
        load_json(tmpdir.path().join("missing.json")),
        Err(Error::IoPath { .. })
    ));
}

#[test]
fn test_png_file_roundtrip() {
    let tmpdir = tempfile::tempdir().unwrap();
    let path = tmpdir.path().join("calib.png");
    let calib = device_calib();
    save_in_png(&calib, &path).unwrap();
    assert_eq!(load_from_png(&path).unwrap(), calib);
}

#[test]
fn test_png_without_calib() {
    let tmpdir = tempfile::tempdir().unwrap();
    let path = tmpdir.path().join("plain.png");
    image::GrayImage::new(2, 2).save(&path).unwrap();
    assert!(matches!(load_from_png(&path), Err(Error::NoCalibChunk(_))));
}

#[test]
fn test_png_corrupt_calib() {
    let tmpdir = tempfile::tempdir().unwrap();
    let path = tmpdir.path().join("calib.png");
    save_in_png(&device_calib(), &path).unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    let pos = bytes.windows(4).position(|w| w == b"caLb").unwrap();
    bytes[pos + 20] ^= 0x01;
    std::fs::write(&path, &bytes).unwrap();

    let err = load_from_png(&path).unwrap_err();
    assert!(matches!(err, Error::ChunkDecode { .. }));
    assert!(err.to_string().starts_with("PNGChunk decode err"));
}

#[test]
fn test_png_short_calib_chunk() {
    let tmpdir = tempfile::tempdir().unwrap();
    let path = tmpdir.path().join("short.png");
    let mut png = png_calib_chunk::PNG_SIGNATURE.to_vec();
    png_calib_chunk::write_raw_chunk(&mut png, b"caLb", &[0, 0, 0, 9]).unwrap();
    png_calib_chunk::write_raw_chunk(&mut png, b"IEND", &[]).unwrap();
    std::fs::write(&path, &png).unwrap();

    let err = load_from_png(&path).unwrap_err();
    assert!(matches!(err, Error::ChunkDecode { .. }));
    assert!(err.to_string().starts_with("PNGChunk decode err"));
}
