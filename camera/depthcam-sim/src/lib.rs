//! A simulated depth camera SDK.
//!
//! Devices are described by a [SimConfig], usually loaded from a TOML file:
//!
//! ```toml
//! [[device]]
//! id = "SIM-0100"
//! ip = "192.168.1.20"
//! scale_unit = 0.25
//!
//! [device.depth]
//! calib_width = 640
//! calib_height = 480
//! fx = 520.0
//! fy = 520.0
//! cx = 320.0
//! cy = 240.0
//! modes = [{ format = "depth16", width = 640, height = 480 }]
//! ```
//!
//! Without a file, [SimConfig::default] describes two devices: `SIM-0001`
//! with depth, color and both IR sensors, and `SIM-0002` with a depth sensor
//! only and no scale unit.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;

use depthcam::{
    CameraCalibInfo, Component, Components, DepthCamera, DepthCameraModule, DeviceInfo,
    Distortion, Extrinsic, ExtrinsicTarget, Feature, FloatFeature, ImageMode, Intrinsic,
    LibVersion, PixelFormat,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("From {path}: {source}")]
    IoPath {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML deserialization error: {source}")]
    TomlDeError {
        #[from]
        source: toml::de::Error,
    },
    #[error("invalid simulated device configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, Error>;

fn default_model() -> String {
    "SIM-DS1".to_string()
}

fn default_interface() -> String {
    "sim".to_string()
}

/// All simulated devices.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    #[serde(default, rename = "device")]
    pub devices: Vec<SimDeviceConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimDeviceConfig {
    /// Serial number.
    pub id: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_interface")]
    pub interface: String,
    pub ip: Option<String>,
    /// Depth units in millimeters. When missing, the depth sensor does not
    /// have the scale unit feature.
    pub scale_unit: Option<f32>,
    pub depth: Option<SimSensorConfig>,
    pub color: Option<SimSensorConfig>,
    pub ir_left: Option<SimSensorConfig>,
    pub ir_right: Option<SimSensorConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimSensorConfig {
    /// Resolution the factory calibration refers to.
    pub calib_width: u32,
    pub calib_height: u32,
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    /// Row-major 4x4. Identity when missing.
    pub extrinsic: Option<[f32; 16]>,
    /// When missing, the sensor does not have the distortion feature.
    pub distortion: Option<[f32; 12]>,
    /// Supported image modes. The first is selected when the device opens.
    pub modes: Vec<ImageMode>,
    pub extrinsic_to_depth: Option<[f32; 16]>,
    pub extrinsic_to_ir_left: Option<[f32; 16]>,
}

impl SimConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: SimConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| Error::IoPath {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::BTreeSet::new();
        for device in self.devices.iter() {
            if !seen.insert(device.id.as_str()) {
                return Err(Error::Invalid(format!("duplicate device id {}", device.id)));
            }
            for component in Component::ALL {
                if let Some(sensor) = device.sensor(component) {
                    if sensor.modes.is_empty() {
                        return Err(Error::Invalid(format!(
                            "{}: {component} sensor has no image modes",
                            device.id
                        )));
                    }
                    if sensor.calib_width == 0 || sensor.calib_height == 0 {
                        return Err(Error::Invalid(format!(
                            "{}: {component} sensor has zero calibration size",
                            device.id
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

impl SimDeviceConfig {
    fn sensor(&self, component: Component) -> Option<&SimSensorConfig> {
        match component {
            Component::Depth => self.depth.as_ref(),
            Component::Color => self.color.as_ref(),
            Component::IrLeft => self.ir_left.as_ref(),
            Component::IrRight => self.ir_right.as_ref(),
        }
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.id.clone(),
            model: self.model.clone(),
            interface: self.interface.clone(),
            ip: self.ip.clone(),
        }
    }
}

fn translation_x(tx: f32) -> [f32; 16] {
    Extrinsic::from_translation(tx, 0.0, 0.0).data
}

fn stereo_sensor(format: PixelFormat) -> SimSensorConfig {
    SimSensorConfig {
        calib_width: 1280,
        calib_height: 960,
        fx: 1040.5,
        fy: 1040.5,
        cx: 641.2,
        cy: 479.8,
        extrinsic: None,
        distortion: None,
        modes: [(1280, 960), (640, 480), (320, 240)]
            .into_iter()
            .map(|(width, height)| ImageMode {
                format,
                width,
                height,
            })
            .collect(),
        extrinsic_to_depth: None,
        extrinsic_to_ir_left: None,
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        let full = SimDeviceConfig {
            id: "SIM-0001".into(),
            model: default_model(),
            interface: "sim-eth0".into(),
            ip: Some("192.168.1.10".into()),
            scale_unit: Some(0.25),
            depth: Some(stereo_sensor(PixelFormat::Depth16)),
            color: Some(SimSensorConfig {
                calib_width: 1920,
                calib_height: 1080,
                fx: 1380.0,
                fy: 1381.5,
                cx: 958.3,
                cy: 541.7,
                extrinsic: Some(translation_x(-25.0)),
                distortion: Some([
                    0.101, -0.052, 0.0011, 0.0005, 0.012, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
                ]),
                modes: [(1920, 1080), (1280, 720), (640, 360)]
                    .into_iter()
                    .map(|(width, height)| ImageMode {
                        format: PixelFormat::Yuyv,
                        width,
                        height,
                    })
                    .collect(),
                extrinsic_to_depth: Some(translation_x(-25.0)),
                extrinsic_to_ir_left: Some(translation_x(-25.0)),
            }),
            ir_left: Some(stereo_sensor(PixelFormat::Mono8)),
            ir_right: Some(SimSensorConfig {
                extrinsic: Some(translation_x(-50.0)),
                extrinsic_to_depth: Some(translation_x(-50.0)),
                extrinsic_to_ir_left: Some(translation_x(-50.0)),
                ..stereo_sensor(PixelFormat::Mono8)
            }),
        };
        let depth_only = SimDeviceConfig {
            id: "SIM-0002".into(),
            model: "SIM-D0".into(),
            interface: "sim-usb".into(),
            ip: None,
            scale_unit: None,
            depth: Some(stereo_sensor(PixelFormat::Depth16)),
            color: None,
            ir_left: None,
            ir_right: None,
        };
        Self {
            devices: vec![full, depth_only],
        }
    }
}

// ---------------------------
// SimModule

/// The simulated SDK.
pub struct SimModule {
    config: SimConfig,
}

/// Open the simulated SDK with the built-in devices.
pub fn new_module() -> SimModule {
    SimModule::new(SimConfig::default())
}

impl SimModule {
    pub fn new(config: SimConfig) -> Self {
        Self { config }
    }
}

impl DepthCameraModule for SimModule {
    type CameraType = SimCamera;

    fn name(&self) -> &str {
        "sim"
    }

    fn version(&self) -> LibVersion {
        LibVersion {
            major: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
            minor: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
            patch: env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
        }
    }

    fn device_infos(&self) -> depthcam::Result<Vec<DeviceInfo>> {
        Ok(self
            .config
            .devices
            .iter()
            .map(SimDeviceConfig::device_info)
            .collect())
    }

    fn open(&mut self, info: &DeviceInfo) -> depthcam::Result<SimCamera> {
        let device = self
            .config
            .devices
            .iter()
            .find(|d| d.id == info.id)
            .ok_or_else(|| depthcam::Error::DeviceNotFound(format!("serial {}", info.id)))?;
        debug!("opening simulated device {}", device.id);
        Ok(SimCamera::new(device.clone()))
    }
}

// ---------------------------
// SimCamera

pub struct SimCamera {
    info: DeviceInfo,
    device: SimDeviceConfig,
    current_modes: BTreeMap<Component, ImageMode>,
}

impl SimCamera {
    fn new(device: SimDeviceConfig) -> Self {
        let current_modes = Component::ALL
            .into_iter()
            .filter_map(|c| {
                let sensor = device.sensor(c)?;
                sensor.modes.first().map(|m| (c, *m))
            })
            .collect();
        Self {
            info: device.device_info(),
            device,
            current_modes,
        }
    }

    fn sensor(&self, component: Component) -> depthcam::Result<&SimSensorConfig> {
        self.device
            .sensor(component)
            .ok_or(depthcam::Error::ComponentNotPresent(component))
    }
}

impl DepthCamera for SimCamera {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn components(&self) -> depthcam::Result<Components> {
        Ok(Component::ALL
            .into_iter()
            .filter(|c| self.device.sensor(*c).is_some())
            .collect())
    }

    fn has_feature(&self, component: Component, feature: Feature) -> depthcam::Result<bool> {
        let sensor = match self.device.sensor(component) {
            Some(sensor) => sensor,
            None => return Ok(false),
        };
        let has = match feature {
            Feature::CalibData | Feature::Intrinsic | Feature::ImageMode => true,
            Feature::Distortion => sensor.distortion.is_some(),
            Feature::ExtrinsicToDepth => sensor.extrinsic_to_depth.is_some(),
            Feature::ExtrinsicToIrLeft => sensor.extrinsic_to_ir_left.is_some(),
            Feature::ScaleUnit => {
                component == Component::Depth && self.device.scale_unit.is_some()
            }
        };
        Ok(has)
    }

    fn calib_data(&self, component: Component) -> depthcam::Result<CameraCalibInfo> {
        let sensor = self.sensor(component)?;
        Ok(CameraCalibInfo {
            intrinsic_width: sensor.calib_width,
            intrinsic_height: sensor.calib_height,
            intrinsic: Intrinsic::from_params(sensor.fx, sensor.fy, sensor.cx, sensor.cy),
            extrinsic: sensor
                .extrinsic
                .map(|data| Extrinsic { data })
                .unwrap_or_default(),
            distortion: sensor
                .distortion
                .map(|data| Distortion { data })
                .unwrap_or_default(),
        })
    }

    fn intrinsic(&self, component: Component) -> depthcam::Result<Intrinsic> {
        let sensor = self.sensor(component)?;
        let mode = self.image_mode(component)?;
        let sx = mode.width as f32 / sensor.calib_width as f32;
        let sy = mode.height as f32 / sensor.calib_height as f32;
        Ok(Intrinsic::from_params(sensor.fx, sensor.fy, sensor.cx, sensor.cy).scaled(sx, sy))
    }

    fn extrinsic_to(
        &self,
        component: Component,
        target: ExtrinsicTarget,
    ) -> depthcam::Result<Extrinsic> {
        let sensor = self.sensor(component)?;
        let data = match target {
            ExtrinsicTarget::Depth => sensor.extrinsic_to_depth,
            ExtrinsicTarget::IrLeft => sensor.extrinsic_to_ir_left,
        };
        data.map(|data| Extrinsic { data })
            .ok_or(depthcam::Error::FeatureNotPresent {
                component,
                feature: target.into(),
            })
    }

    fn image_mode(&self, component: Component) -> depthcam::Result<ImageMode> {
        self.current_modes
            .get(&component)
            .copied()
            .ok_or(depthcam::Error::ComponentNotPresent(component))
    }

    fn image_modes(&self, component: Component) -> depthcam::Result<Vec<ImageMode>> {
        Ok(self.sensor(component)?.modes.clone())
    }

    fn set_image_mode(&mut self, component: Component, mode: ImageMode) -> depthcam::Result<()> {
        let sensor = self.sensor(component)?;
        if !sensor.modes.contains(&mode) {
            return Err(depthcam::Error::UnsupportedImageMode { component, mode });
        }
        debug!("{}: {component} image mode -> {mode}", self.info.id);
        self.current_modes.insert(component, mode);
        Ok(())
    }

    fn float(&self, component: Component, feature: FloatFeature) -> depthcam::Result<f32> {
        match (component, feature) {
            (Component::Depth, FloatFeature::ScaleUnit) => {
                self.device
                    .scale_unit
                    .ok_or(depthcam::Error::FeatureNotPresent {
                        component,
                        feature: feature.into(),
                    })
            }
            _ => Err(depthcam::Error::FeatureNotPresent {
                component,
                feature: feature.into(),
            }),
        }
    }

    fn close(self) -> depthcam::Result<()> {
        debug!("closing simulated device {}", self.info.id);
        Ok(())
    }
}
