//! Calibration info of a depth camera and its persistence.
//!
//! [CalibInfo] holds the calibration of the depth sensor and the optional
//! color sensor. It can be read from a device ([calib_info_from_device]),
//! stored as JSON ([save_json], [load_json]) or embedded in a PNG file
//! ([save_in_png], [load_from_png]).

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use depthcam::{CameraCalibInfo, Distortion, Extrinsic, Intrinsic};
pub use png_calib_chunk::DecodeError;

mod device;
pub use device::{
    ExtrinsicEntry, ExtrinsicSource, IntrinsicSource, calib_info_from_device, extrinsics_report,
    format_extrinsic,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("PNG error: {source}")]
    Png {
        #[source]
        source: png_calib_chunk::Error,
    },
    #[error("PNGChunk decode err {source}")]
    ChunkDecode {
        #[from]
        source: DecodeError,
    },
    #[error("no calibration chunk in {0}")]
    NoCalibChunk(String),
    #[error("device error: {source}")]
    Device {
        #[from]
        source: depthcam::Error,
    },
    #[error("From {path}: {source}")]
    IoPath {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<png_calib_chunk::Error> for Error {
    fn from(orig: png_calib_chunk::Error) -> Error {
        match orig {
            png_calib_chunk::Error::Decode { source } => Error::ChunkDecode { source },
            source => Error::Png { source },
        }
    }
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn local_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

fn default_scale_unit() -> f32 {
    1.0
}

/// Calibration of one depth camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibInfo {
    sn: String,
    timestamp: String,
    depth_calib: Option<CameraCalibInfo>,
    /// Depth units in millimeters.
    #[serde(default = "default_scale_unit")]
    scale_unit: f32,
    #[serde(default)]
    has_depth_distortion: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rgb_calib: Option<CameraCalibInfo>,
}

impl Default for CalibInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibInfo {
    /// An empty calibration timestamped now.
    pub fn new() -> Self {
        Self {
            sn: String::new(),
            timestamp: local_timestamp(),
            depth_calib: None,
            scale_unit: default_scale_unit(),
            has_depth_distortion: false,
            rgb_calib: None,
        }
    }

    pub fn sn(&self) -> &str {
        &self.sn
    }
    pub fn set_sn(&mut self, sn: impl Into<String>) {
        self.sn = sn.into();
    }
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }
    pub fn set_timestamp(&mut self, timestamp: impl Into<String>) {
        self.timestamp = timestamp.into();
    }

    pub fn depth_calib(&self) -> Option<&CameraCalibInfo> {
        self.depth_calib.as_ref()
    }
    pub fn set_depth_calib(&mut self, calib: CameraCalibInfo) {
        self.depth_calib = Some(calib);
    }
    pub fn scale_unit(&self) -> f32 {
        self.scale_unit
    }
    pub fn set_scale_unit(&mut self, scale_unit: f32) {
        self.scale_unit = scale_unit;
    }
    pub fn has_depth_distortion(&self) -> bool {
        self.has_depth_distortion
    }
    pub fn set_has_depth_distortion(&mut self, value: bool) {
        self.has_depth_distortion = value;
    }

    pub fn has_rgb(&self) -> bool {
        self.rgb_calib.is_some()
    }
    pub fn rgb_calib(&self) -> Option<&CameraCalibInfo> {
        self.rgb_calib.as_ref()
    }
    pub fn set_rgb_calib(&mut self, calib: Option<CameraCalibInfo>) {
        self.rgb_calib = calib;
    }
}

fn write_sensor(
    f: &mut std::fmt::Formatter,
    name: &str,
    calib: &CameraCalibInfo,
) -> std::fmt::Result {
    let k = &calib.intrinsic;
    writeln!(
        f,
        "{name}: {}x{} fx={:.3} fy={:.3} cx={:.3} cy={:.3}",
        calib.intrinsic_width,
        calib.intrinsic_height,
        k.fx(),
        k.fy(),
        k.cx(),
        k.cy()
    )?;
    writeln!(f, "{name} extrinsic:")?;
    f.write_str(&format_extrinsic(&calib.extrinsic))
}

impl std::fmt::Display for CalibInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "sn: {}", self.sn)?;
        writeln!(f, "timestamp: {}", self.timestamp)?;
        match self.depth_calib() {
            Some(calib) => write_sensor(f, "depth", calib)?,
            None => writeln!(f, "depth: none")?,
        }
        writeln!(f, "scale unit: {}", self.scale_unit())?;
        writeln!(f, "depth distortion: {}", self.has_depth_distortion())?;
        match self.rgb_calib() {
            Some(calib) => write_sensor(f, "color", calib),
            None => writeln!(f, "color: none"),
        }
    }
}

/// Serialize to the JSON calibration document.
pub fn to_json_string(calib: &CalibInfo) -> Result<String> {
    Ok(serde_json::to_string_pretty(calib)?)
}

/// Parse a JSON calibration document.
pub fn from_json_str(text: &str) -> Result<CalibInfo> {
    Ok(serde_json::from_str(text)?)
}

fn io_path_err(path: &Path) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |source| Error::IoPath {
        path: path.display().to_string(),
        source,
    }
}

pub fn save_json<P: AsRef<Path>>(calib: &CalibInfo, path: P) -> Result<()> {
    let path = path.as_ref();
    let text = to_json_string(calib)?;
    std::fs::write(path, text).map_err(io_path_err(path))
}

pub fn load_json<P: AsRef<Path>>(path: P) -> Result<CalibInfo> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(io_path_err(path))?;
    from_json_str(&text)
}

/// Save the JSON document in a calibration chunk of the PNG file at `path`.
///
/// See [png_calib_chunk::save_chunk_to_file] for how an existing file is
/// treated.
pub fn save_in_png<P: AsRef<Path>>(calib: &CalibInfo, path: P) -> Result<()> {
    let text = to_json_string(calib)?;
    let record = png_calib_chunk::ChunkRecord::encode(&text)?;
    png_calib_chunk::save_chunk_to_file(path, &record)?;
    Ok(())
}

/// Load the calibration embedded in the PNG file at `path`.
///
/// A PNG without a calibration chunk gives [Error::NoCalibChunk], a corrupt
/// chunk gives [Error::ChunkDecode].
pub fn load_from_png<P: AsRef<Path>>(path: P) -> Result<CalibInfo> {
    let path = path.as_ref();
    let record = png_calib_chunk::read_chunk_from_file(path)?
        .ok_or_else(|| Error::NoCalibChunk(path.display().to_string()))?;
    let text = record.decode()?;
    from_json_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_calib() -> CalibInfo {
        let mut calib = CalibInfo::new();
        calib.set_sn("ABC123");
        calib.set_timestamp("2024-03-05 10:20:30");
        calib.set_depth_calib(CameraCalibInfo {
            intrinsic_width: 640,
            intrinsic_height: 480,
            intrinsic: Intrinsic::from_params(520.25, 520.5, 320.1, 239.9),
            extrinsic: Extrinsic::identity(),
            distortion: Distortion::default(),
        });
        calib.set_scale_unit(0.25);
        calib
    }

    #[test]
    fn test_new_has_timestamp() {
        let calib = CalibInfo::new();
        assert!(chrono::NaiveDateTime::parse_from_str(calib.timestamp(), TIMESTAMP_FORMAT).is_ok());
        assert_eq!(calib.scale_unit(), 1.0);
        assert!(!calib.has_rgb());
        assert!(calib.depth_calib().is_none());
    }

    #[test]
    fn test_json_roundtrip() {
        let mut calib = sample_calib();
        let text = to_json_string(&calib).unwrap();
        assert!(!text.contains("rgb_calib"));
        assert_eq!(from_json_str(&text).unwrap(), calib);

        calib.set_rgb_calib(calib.depth_calib().copied());
        let text = to_json_string(&calib).unwrap();
        let loaded = from_json_str(&text).unwrap();
        assert!(loaded.has_rgb());
        assert_eq!(loaded, calib);
    }

    #[test]
    fn test_json_defaults() {
        let text = r#"{"sn":"X","timestamp":"t","depth_calib":null}"#;
        let calib = from_json_str(text).unwrap();
        assert_eq!(calib.scale_unit(), 1.0);
        assert!(!calib.has_depth_distortion());
        assert!(!calib.has_rgb());
    }

    #[test]
    fn test_json_garbage() {
        assert!(matches!(
            from_json_str("{not json"),
            Err(Error::Json { .. })
        ));
    }

    #[test]
    fn test_codec_decode_error_is_chunk_decode() {
        let err: Error = png_calib_chunk::Error::from(DecodeError::TooShort(5)).into();
        assert!(matches!(
            err,
            Error::ChunkDecode {
                source: DecodeError::TooShort(5)
            }
        ));
        assert!(err.to_string().starts_with("PNGChunk decode err"));

        let err: Error = png_calib_chunk::Error::NotPng.into();
        assert!(matches!(err, Error::Png { .. }));
    }

    #[test]
    fn test_display() {
        let text = sample_calib().to_string();
        assert!(text.contains("sn: ABC123"));
        assert!(text.contains("depth: 640x480 fx=520.250"));
        assert!(text.contains("scale unit: 0.25"));
        assert!(text.contains("color: none"));
    }
}
