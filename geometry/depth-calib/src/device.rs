use tracing::{debug, warn};

use depthcam::{
    CameraCalibInfo, Component, DepthCamera, Extrinsic, ExtrinsicTarget, Feature, FloatFeature,
};

use crate::{CalibInfo, Result};

/// Which intrinsic matrix to store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntrinsicSource {
    /// The factory calibration, at the calibration resolution.
    #[default]
    Factory,
    /// The intrinsics for the image mode selected now. Set all image modes
    /// before reading.
    Current,
}

fn sensor_calib<C: DepthCamera + ?Sized>(
    cam: &C,
    component: Component,
    source: IntrinsicSource,
) -> Result<CameraCalibInfo> {
    let mut info = cam.calib_data(component)?;
    if source == IntrinsicSource::Current {
        info.intrinsic = cam.intrinsic(component)?;
        let mode = cam.image_mode(component)?;
        info.intrinsic_width = mode.width;
        info.intrinsic_height = mode.height;
    }
    Ok(info)
}

/// Read the calibration of the depth and color sensors.
///
/// The serial number is taken from the device, the timestamp is the current
/// time. A sensor which is not present is left out. A missing scale unit
/// feature leaves the default of 1.0.
pub fn calib_info_from_device<C: DepthCamera + ?Sized>(
    cam: &C,
    source: IntrinsicSource,
) -> Result<CalibInfo> {
    let mut calib = CalibInfo::new();
    calib.set_sn(cam.info().id.clone());

    let components = cam.components()?;
    if components.contains(Component::Depth) {
        calib.set_depth_calib(sensor_calib(cam, Component::Depth, source)?);
        if cam.has_feature(Component::Depth, Feature::ScaleUnit)? {
            let scale_unit = cam.float(Component::Depth, FloatFeature::ScaleUnit)?;
            calib.set_scale_unit(scale_unit);
        } else {
            debug!("{}: no scale unit feature", cam.info().id);
        }
        calib.set_has_depth_distortion(cam.has_feature(Component::Depth, Feature::Distortion)?);
    } else {
        warn!("{}: no depth sensor", cam.info().id);
    }

    if components.contains(Component::Color) {
        calib.set_rgb_calib(Some(sensor_calib(cam, Component::Color, source)?));
    }
    Ok(calib)
}

/// Where an extrinsic matrix in the report comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtrinsicSource {
    /// The extrinsic stored in the sensor's calibration data.
    CalibData,
    ToDepth,
    ToIrLeft,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtrinsicEntry {
    pub component: Component,
    pub source: ExtrinsicSource,
    /// `None` when the device could not provide it.
    pub extrinsic: Option<Extrinsic>,
}

impl std::fmt::Display for ExtrinsicEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let what = match self.source {
            ExtrinsicSource::CalibData => "from calibration data",
            ExtrinsicSource::ToDepth => "to depth",
            ExtrinsicSource::ToIrLeft => "to IR left",
        };
        match &self.extrinsic {
            Some(e) => {
                writeln!(f, "{} extrinsics {what}:", self.component)?;
                f.write_str(&format_extrinsic(e))
            }
            None => writeln!(f, "{} extrinsics {what}: unavailable", self.component),
        }
    }
}

/// Collect the extrinsics relating the color and IR sensors to depth and IR
/// left.
///
/// Entries which the device cannot provide are kept with `extrinsic: None`.
pub fn extrinsics_report<C: DepthCamera + ?Sized>(cam: &C) -> Vec<ExtrinsicEntry> {
    let wanted = [
        (Component::Color, ExtrinsicSource::CalibData),
        (Component::IrRight, ExtrinsicSource::CalibData),
        (Component::Color, ExtrinsicSource::ToDepth),
        (Component::IrRight, ExtrinsicSource::ToDepth),
        (Component::IrLeft, ExtrinsicSource::ToDepth),
        (Component::Color, ExtrinsicSource::ToIrLeft),
        (Component::IrRight, ExtrinsicSource::ToIrLeft),
    ];
    wanted
        .into_iter()
        .map(|(component, source)| {
            let result = match source {
                ExtrinsicSource::CalibData => cam.calib_data(component).map(|c| c.extrinsic),
                ExtrinsicSource::ToDepth => cam.extrinsic_to(component, ExtrinsicTarget::Depth),
                ExtrinsicSource::ToIrLeft => cam.extrinsic_to(component, ExtrinsicTarget::IrLeft),
            };
            let extrinsic = match result {
                Ok(e) => Some(e),
                Err(e) => {
                    debug!("{component} extrinsic {source:?}: {e}");
                    None
                }
            };
            ExtrinsicEntry {
                component,
                source,
                extrinsic,
            }
        })
        .collect()
}

/// Four lines of four values each.
pub fn format_extrinsic(extrinsic: &Extrinsic) -> String {
    let mut result = String::new();
    for row in extrinsic.data.chunks_exact(4) {
        let row: Vec<String> = row.iter().map(|v| format!("{v:.6}")).collect();
        result.push_str(&row.join(" "));
        result.push('\n');
    }
    result
}
