use serde::{Deserialize, Serialize};

/// A sensor on a depth camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Depth,
    Color,
    IrLeft,
    IrRight,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::Depth,
        Component::Color,
        Component::IrLeft,
        Component::IrRight,
    ];

    fn bit(self) -> u32 {
        match self {
            Component::Depth => 1 << 0,
            Component::Color => 1 << 1,
            Component::IrLeft => 1 << 2,
            Component::IrRight => 1 << 3,
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            Component::Depth => "depth",
            Component::Color => "color",
            Component::IrLeft => "IR left",
            Component::IrRight => "IR right",
        };
        f.write_str(s)
    }
}

/// The set of sensors present on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Components(u32);

impl Components {
    pub fn empty() -> Self {
        Self(0)
    }
    pub fn contains(&self, component: Component) -> bool {
        self.0 & component.bit() != 0
    }
    pub fn insert(&mut self, component: Component) {
        self.0 |= component.bit();
    }
    pub fn iter(&self) -> impl Iterator<Item = Component> + '_ {
        Component::ALL.into_iter().filter(|c| self.contains(*c))
    }
}

impl FromIterator<Component> for Components {
    fn from_iter<I: IntoIterator<Item = Component>>(iter: I) -> Self {
        let mut result = Components::empty();
        for c in iter {
            result.insert(c);
        }
        result
    }
}

/// Something a component may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    CalibData,
    Intrinsic,
    Distortion,
    ExtrinsicToDepth,
    ExtrinsicToIrLeft,
    ImageMode,
    ScaleUnit,
}

/// Float-valued features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatFeature {
    /// Depth value units in millimeters.
    ScaleUnit,
}

impl From<FloatFeature> for Feature {
    fn from(orig: FloatFeature) -> Feature {
        match orig {
            FloatFeature::ScaleUnit => Feature::ScaleUnit,
        }
    }
}

/// The frame an extrinsic transform maps into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtrinsicTarget {
    Depth,
    IrLeft,
}

impl From<ExtrinsicTarget> for Feature {
    fn from(orig: ExtrinsicTarget) -> Feature {
        match orig {
            ExtrinsicTarget::Depth => Feature::ExtrinsicToDepth,
            ExtrinsicTarget::IrLeft => Feature::ExtrinsicToIrLeft,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Depth16,
    Mono8,
    Mono16,
    Rgb,
    Yuyv,
    Jpeg,
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            PixelFormat::Depth16 => "DEPTH16",
            PixelFormat::Mono8 => "MONO8",
            PixelFormat::Mono16 => "MONO16",
            PixelFormat::Rgb => "RGB",
            PixelFormat::Yuyv => "YUYV",
            PixelFormat::Jpeg => "JPEG",
        };
        f.write_str(s)
    }
}

/// Pixel format and resolution a sensor streams at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageMode {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for ImageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} {}x{}", self.format, self.width, self.height)
    }
}

/// Row-major 3x3 camera matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsic {
    pub data: [f32; 9],
}

impl Intrinsic {
    pub fn from_params(fx: f32, fy: f32, cx: f32, cy: f32) -> Self {
        Self {
            data: [fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0],
        }
    }
    pub fn fx(&self) -> f32 {
        self.data[0]
    }
    pub fn fy(&self) -> f32 {
        self.data[4]
    }
    pub fn cx(&self) -> f32 {
        self.data[2]
    }
    pub fn cy(&self) -> f32 {
        self.data[5]
    }

    /// The camera matrix for an image resized by `sx` horizontally and `sy`
    /// vertically.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        let mut data = self.data;
        data[0] *= sx;
        data[1] *= sx;
        data[2] *= sx;
        data[4] *= sy;
        data[5] *= sy;
        Self { data }
    }
}

/// Row-major 4x4 rigid transform. Translation is in millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extrinsic {
    pub data: [f32; 16],
}

impl Extrinsic {
    pub fn identity() -> Self {
        let mut data = [0.0; 16];
        for i in 0..4 {
            data[i * 5] = 1.0;
        }
        Self { data }
    }

    pub fn from_translation(tx: f32, ty: f32, tz: f32) -> Self {
        let mut result = Self::identity();
        result.data[3] = tx;
        result.data[7] = ty;
        result.data[11] = tz;
        result
    }
}

impl Default for Extrinsic {
    fn default() -> Self {
        Self::identity()
    }
}

/// Lens distortion coefficients `k1, k2, p1, p2, k3, k4, k5, k6, s1, s2, s3, s4`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Distortion {
    pub data: [f32; 12],
}

/// Calibration of one sensor as stored on the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibInfo {
    /// Image width the intrinsic matrix refers to.
    pub intrinsic_width: u32,
    /// Image height the intrinsic matrix refers to.
    pub intrinsic_height: u32,
    pub intrinsic: Intrinsic,
    pub extrinsic: Extrinsic,
    pub distortion: Distortion,
}

/// Identifies a device found during enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Serial number.
    pub id: String,
    pub model: String,
    /// The host interface the device was found on.
    pub interface: String,
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl std::fmt::Display for LibVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
