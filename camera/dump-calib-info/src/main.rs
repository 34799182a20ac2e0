use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Args, Parser, ValueEnum};
use tracing::{debug, info, warn};

use depth_calib::{CalibInfo, IntrinsicSource};
use depthcam::{Component, DepthCamera, DepthCameraModule};
use depthcam_sim::{SimConfig, SimModule};

const DEFAULT_LOG_FILTER: &str = "dump_calib_info=info,depth_calib=info,depthcam_sim=info,warn";

#[derive(Debug, Args)]
struct Backend {
    /// TOML file describing the simulated devices. Built-in devices are used
    /// when not given.
    #[arg(long, env = "DUMP_CALIB_SIM_CONFIG")]
    sim_config: Option<PathBuf>,
}

impl Backend {
    fn module(&self) -> Result<SimModule> {
        let config = match &self.sim_config {
            Some(path) => SimConfig::from_path(path)
                .with_context(|| format!("loading simulated devices from {}", path.display()))?,
            None => SimConfig::default(),
        };
        let module = SimModule::new(config);
        debug!("backend {} {}", module.name(), module.version());
        Ok(module)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// factory calibration at the calibration resolution
    Factory,
    /// intrinsics of the selected image modes
    Current,
}

impl From<Mode> for IntrinsicSource {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Factory => IntrinsicSource::Factory,
            Mode::Current => IntrinsicSource::Current,
        }
    }
}

#[derive(Debug, Args)]
struct Dump {
    /// serial number of the device to open
    #[arg(long, env = "DUMP_CALIB_ID")]
    id: Option<String>,

    /// IP address of the device to open, used when no serial number is given
    #[arg(long, env = "DUMP_CALIB_IP")]
    ip: Option<String>,

    /// index of the color image mode to select
    #[arg(long)]
    cs: Option<usize>,

    /// index of the depth image mode to select
    #[arg(long)]
    ds: Option<usize>,

    /// which intrinsics to save
    #[arg(long, value_enum, default_value_t = Mode::Factory)]
    mode: Mode,

    /// JSON output file
    #[arg(long, default_value = "calib.json")]
    out_json: PathBuf,

    /// PNG file to store the calibration in. An existing PNG keeps its image.
    #[arg(long)]
    out_png: Option<PathBuf>,

    /// print the extrinsics between the sensors
    #[arg(long)]
    print_extrinsics: bool,

    #[command(flatten)]
    backend: Backend,
}

#[derive(Debug, Args)]
struct Show {
    /// `.json` or `.png` calibration file
    file: PathBuf,
}

/// depth camera calibration utilities
#[derive(Debug, Parser)]
#[command(name = "dump-calib-info", author, version)]
enum Command {
    /// read the calibration from a device and save it
    Dump(Dump),

    /// list devices
    List(Backend),

    /// print a saved calibration
    Show(Show),
}

fn list<W: Write>(backend: &Backend, out: &mut W) -> Result<()> {
    let module = backend.module()?;
    for info in module.device_infos()?.iter() {
        let ip = info.ip.as_deref().unwrap_or("-");
        writeln!(out, "{} {} {} {ip}", info.id, info.model, info.interface)?;
    }
    Ok(())
}

fn apply_image_mode<C: DepthCamera>(cam: &mut C, component: Component, index: Option<usize>) {
    let Some(index) = index else {
        return;
    };
    let id = cam.info().id.clone();
    match cam.components() {
        Ok(components) if components.contains(component) => {}
        Ok(_) => {
            warn!("{id}: no {component} sensor, ignoring image mode {index}");
            return;
        }
        Err(e) => {
            warn!("{id}: {e}");
            return;
        }
    }
    let mode = match depthcam::image_mode_by_index(&*cam, component, index) {
        Ok(mode) => mode,
        Err(e) => {
            warn!("{id}: {e}");
            return;
        }
    };
    match cam.set_image_mode(component, mode) {
        Ok(()) => info!("{id}: {component} image mode {mode}"),
        Err(e) => warn!("{id}: setting {component} image mode {mode}: {e}"),
    }
}

fn dump(args: &Dump) -> Result<CalibInfo> {
    let mut module = args.backend.module()?;
    let infos = module.device_infos()?;
    let info = depthcam::select_device(&infos, args.id.as_deref(), args.ip.as_deref())?;
    let mut cam = module
        .open(&info)
        .with_context(|| format!("opening device {}", info.id))?;
    info!("opened device {} ({})", info.id, info.model);

    apply_image_mode(&mut cam, Component::Color, args.cs);
    apply_image_mode(&mut cam, Component::Depth, args.ds);

    let calib = depth_calib::calib_info_from_device(&cam, args.mode.into())
        .with_context(|| format!("reading calibration of {}", info.id))?;

    depth_calib::save_json(&calib, &args.out_json)?;
    info!("saved calibration to {}", args.out_json.display());

    if let Some(out_png) = &args.out_png {
        depth_calib::save_in_png(&calib, out_png)?;
        info!("saved calibration to {}", out_png.display());
    }

    if args.print_extrinsics {
        for entry in depth_calib::extrinsics_report(&cam) {
            print!("{entry}");
        }
    }

    cam.close()?;
    Ok(calib)
}

fn is_png(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("png"))
}

fn load(path: &Path) -> Result<CalibInfo> {
    if is_png(path) {
        // Keep the decode error text as the top-level message.
        Ok(depth_calib::load_from_png(path)?)
    } else {
        depth_calib::load_json(path)
            .with_context(|| format!("loading calibration from {}", path.display()))
    }
}

fn main() -> Result<()> {
    let _tracing_guard = env_tracing_logger::init(DEFAULT_LOG_FILTER)?;
    let opt = Command::parse();

    match opt {
        Command::Dump(args) => {
            dump(&args)?;
        }
        Command::List(backend) => list(&backend, &mut std::io::stdout().lock())?,
        Command::Show(args) => print!("{}", load(&args.file)?),
    };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dump_args(argv: &[&str]) -> Dump {
        let mut full = vec!["dump-calib-info", "dump"];
        full.extend_from_slice(argv);
        match Command::try_parse_from(full).unwrap() {
            Command::Dump(args) => args,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_defaults() {
        let args = dump_args(&[]);
        assert_eq!(args.mode, Mode::Factory);
        assert_eq!(args.out_json, PathBuf::from("calib.json"));
        assert!(args.out_png.is_none());
        assert!(!args.print_extrinsics);
    }

    #[test]
    fn test_dump_current_modes() {
        let tmpdir = tempfile::tempdir().unwrap();
        let json = tmpdir.path().join("out.json");
        let png = tmpdir.path().join("out.png");
        let args = dump_args(&[
            "--id",
            "SIM-0001",
            "--ds",
            "1",
            "--cs",
            "2",
            "--mode",
            "current",
            "--out-json",
            json.to_str().unwrap(),
            "--out-png",
            png.to_str().unwrap(),
        ]);
        let calib = dump(&args).unwrap();
        assert_eq!(calib.sn(), "SIM-0001");
        let depth = calib.depth_calib().unwrap();
        assert_eq!((depth.intrinsic_width, depth.intrinsic_height), (640, 480));
        let rgb = calib.rgb_calib().unwrap();
        assert_eq!((rgb.intrinsic_width, rgb.intrinsic_height), (640, 360));

        assert_eq!(load(&json).unwrap(), calib);
        assert_eq!(load(&png).unwrap(), calib);
    }

    #[test]
    fn test_dump_ignores_bad_mode_index() {
        let tmpdir = tempfile::tempdir().unwrap();
        let json = tmpdir.path().join("out.json");
        // SIM-0002 has no color sensor and three depth modes.
        let args = dump_args(&[
            "--id",
            "SIM-0002",
            "--cs",
            "0",
            "--ds",
            "7",
            "--mode",
            "current",
            "--out-json",
            json.to_str().unwrap(),
        ]);
        let calib = dump(&args).unwrap();
        assert!(!calib.has_rgb());
        let depth = calib.depth_calib().unwrap();
        assert_eq!((depth.intrinsic_width, depth.intrinsic_height), (1280, 960));
    }

    #[test]
    fn test_dump_unknown_device() {
        let tmpdir = tempfile::tempdir().unwrap();
        let json = tmpdir.path().join("out.json");
        let args = dump_args(&["--id", "NOPE", "--out-json", json.to_str().unwrap()]);
        assert!(dump(&args).is_err());
        assert!(!json.exists());
    }

    #[test]
    fn test_dump_print_extrinsics() {
        let tmpdir = tempfile::tempdir().unwrap();
        let json = tmpdir.path().join("out.json");
        let args = dump_args(&[
            "--id",
            "SIM-0001",
            "--print-extrinsics",
            "--out-json",
            json.to_str().unwrap(),
        ]);
        assert!(args.print_extrinsics);
        let calib = dump(&args).unwrap();
        assert!(calib.has_rgb());
        assert!(json.exists());
    }

    #[test]
    fn test_list() {
        let mut out = Vec::new();
        list(&Backend { sim_config: None }, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "SIM-0001 SIM-DS1 sim-eth0 192.168.1.10",
                "SIM-0002 SIM-D0 sim-usb -"
            ]
        );
    }

    #[test]
    fn test_list_sim_config() {
        let tmpdir = tempfile::tempdir().unwrap();
        let config = tmpdir.path().join("sim.toml");
        std::fs::write(
            &config,
            r#"
[[device]]
id = "SIM-0100"
interface = "lab"
[device.depth]
calib_width = 640
calib_height = 480
fx = 520.0
fy = 520.0
cx = 320.0
cy = 240.0
modes = [{ format = "depth16", width = 640, height = 480 }]
"#,
        )
        .unwrap();
        let argv = ["dump-calib-info", "list", "--sim-config", config.to_str().unwrap()];
        let backend = match Command::try_parse_from(argv).unwrap() {
            Command::List(backend) => backend,
            other => panic!("unexpected {other:?}"),
        };
        let mut out = Vec::new();
        list(&backend, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "SIM-0100 SIM-DS1 lab -\n");

        let missing = Backend {
            sim_config: Some(tmpdir.path().join("missing.toml")),
        };
        assert!(list(&missing, &mut Vec::new()).is_err());
    }

    #[test]
    fn test_show_corrupt_png() {
        let tmpdir = tempfile::tempdir().unwrap();
        let png = tmpdir.path().join("calib.PNG");
        let mut calib = CalibInfo::new();
        calib.set_sn("X1");
        depth_calib::save_in_png(&calib, &png).unwrap();

        let mut bytes = std::fs::read(&png).unwrap();
        let pos = bytes.windows(4).position(|w| w == b"caLb").unwrap();
        bytes[pos + 12] ^= 0x20;
        std::fs::write(&png, &bytes).unwrap();

        let err = load(&png).unwrap_err();
        assert!(err.to_string().starts_with("PNGChunk decode err"));
    }
}
