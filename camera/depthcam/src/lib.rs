//! Traits for talking to structured-light depth cameras.
//!
//! Vendor SDKs expose a handle-based C API with typed struct, enum and float
//! getters per sensor. [DepthCameraModule] and [DepthCamera] capture the
//! part of that API needed to read calibration, so code using them can run
//! against any backend, including a simulated one.

mod types;

pub use types::{
    CameraCalibInfo, Component, Components, DeviceInfo, Distortion, Extrinsic, ExtrinsicTarget,
    Feature, FloatFeature, ImageMode, Intrinsic, LibVersion, PixelFormat,
};

// ---------------------------
// errors

pub type Result<M> = std::result::Result<M, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no devices found")]
    NoDevices,
    #[error("no device with {0}")]
    DeviceNotFound(String),
    #[error("{0} sensor not present")]
    ComponentNotPresent(Component),
    #[error("feature {feature:?} not present on {component} sensor")]
    FeatureNotPresent {
        component: Component,
        feature: Feature,
    },
    #[error("image mode {index} requested but {component} sensor has {count} modes")]
    ImageModeIndex {
        component: Component,
        index: usize,
        count: usize,
    },
    #[error("image mode {mode} not supported by {component} sensor")]
    UnsupportedImageMode { component: Component, mode: ImageMode },
}

// ---------------------------
// DepthCameraModule

/// An SDK able to enumerate and open devices.
pub trait DepthCameraModule {
    type CameraType: DepthCamera;

    fn name(&self) -> &str;
    fn version(&self) -> LibVersion;
    fn device_infos(&self) -> Result<Vec<DeviceInfo>>;
    fn open(&mut self, info: &DeviceInfo) -> Result<Self::CameraType>;
}

// ---------------------------
// DepthCamera

/// An opened device.
pub trait DepthCamera {
    fn info(&self) -> &DeviceInfo;
    fn components(&self) -> Result<Components>;
    fn has_feature(&self, component: Component, feature: Feature) -> Result<bool>;

    /// Factory calibration of a sensor.
    fn calib_data(&self, component: Component) -> Result<CameraCalibInfo>;
    /// The intrinsic matrix for the currently selected image mode.
    fn intrinsic(&self, component: Component) -> Result<Intrinsic>;
    fn extrinsic_to(&self, component: Component, target: ExtrinsicTarget) -> Result<Extrinsic>;

    // Settings: ImageMode ----------------------------
    fn image_mode(&self, component: Component) -> Result<ImageMode>;
    fn image_modes(&self, component: Component) -> Result<Vec<ImageMode>>;
    fn set_image_mode(&mut self, component: Component, mode: ImageMode) -> Result<()>;

    fn float(&self, component: Component, feature: FloatFeature) -> Result<f32>;

    /// Release the device.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Pick a device by serial number, else by IP address, else the first one.
pub fn select_device(
    infos: &[DeviceInfo],
    serial: Option<&str>,
    ip: Option<&str>,
) -> Result<DeviceInfo> {
    if infos.is_empty() {
        return Err(Error::NoDevices);
    }
    let found = match (serial, ip) {
        (Some(serial), _) => infos
            .iter()
            .find(|i| i.id == serial)
            .ok_or_else(|| Error::DeviceNotFound(format!("serial {serial}")))?,
        (None, Some(ip)) => infos
            .iter()
            .find(|i| i.ip.as_deref() == Some(ip))
            .ok_or_else(|| Error::DeviceNotFound(format!("IP {ip}")))?,
        (None, None) => &infos[0],
    };
    Ok(found.clone())
}

/// The `index`-th image mode a sensor supports.
pub fn image_mode_by_index<C: DepthCamera + ?Sized>(
    cam: &C,
    component: Component,
    index: usize,
) -> Result<ImageMode> {
    let modes = cam.image_modes(component)?;
    modes.get(index).copied().ok_or(Error::ImageModeIndex {
        component,
        index,
        count: modes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn infos() -> Vec<DeviceInfo> {
        vec![
            DeviceInfo {
                id: "A1".into(),
                model: "m".into(),
                interface: "eth0".into(),
                ip: Some("10.0.0.1".into()),
            },
            DeviceInfo {
                id: "B2".into(),
                model: "m".into(),
                interface: "usb".into(),
                ip: None,
            },
        ]
    }

    #[test]
    fn test_select_device() {
        let infos = infos();
        assert_eq!(select_device(&infos, None, None).unwrap().id, "A1");
        assert_eq!(select_device(&infos, Some("B2"), None).unwrap().id, "B2");
        assert_eq!(
            select_device(&infos, None, Some("10.0.0.1")).unwrap().id,
            "A1"
        );
        // serial wins over IP
        assert_eq!(
            select_device(&infos, Some("B2"), Some("10.0.0.1")).unwrap().id,
            "B2"
        );
        assert!(matches!(
            select_device(&infos, Some("C3"), None),
            Err(Error::DeviceNotFound(_))
        ));
        assert!(matches!(
            select_device(&[], None, None),
            Err(Error::NoDevices)
        ));
    }

    #[test]
    fn test_components() {
        let comps: Components = [Component::Depth, Component::IrRight].into_iter().collect();
        assert!(comps.contains(Component::Depth));
        assert!(!comps.contains(Component::Color));
        assert_eq!(
            comps.iter().collect::<Vec<_>>(),
            vec![Component::Depth, Component::IrRight]
        );
        assert!(Components::empty().iter().next().is_none());
    }

    #[test]
    fn test_intrinsic_scaling() {
        let k = Intrinsic::from_params(1000.0, 1002.0, 640.0, 480.0);
        let half = k.scaled(0.5, 0.5);
        assert_eq!(half.fx(), 500.0);
        assert_eq!(half.fy(), 501.0);
        assert_eq!(half.cx(), 320.0);
        assert_eq!(half.cy(), 240.0);
        assert_eq!(half.data[8], 1.0);
    }

    #[test]
    fn test_extrinsic_translation() {
        let e = Extrinsic::from_translation(25.0, 0.0, -1.0);
        assert_eq!(e.data[0], 1.0);
        assert_eq!(e.data[15], 1.0);
        assert_eq!(e.data[3], 25.0);
        assert_eq!(e.data[11], -1.0);
        assert_eq!(Extrinsic::default(), Extrinsic::identity());
    }

    #[test]
    fn test_image_mode_serde() {
        let mode = ImageMode {
            format: PixelFormat::Depth16,
            width: 640,
            height: 480,
        };
        let json = serde_json::to_string(&mode).unwrap();
        assert_eq!(json, r#"{"format":"depth16","width":640,"height":480}"#);
        assert_eq!(mode.to_string(), "DEPTH16 640x480");
    }
}
