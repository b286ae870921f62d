pub mod decoder;
pub mod device;
pub mod frame;
pub mod synthetic;

pub use decoder::{DecodeError, PixelDecoder};
pub use device::{DeviceError, DeviceErrorKind, DeviceService};
pub use frame::{FrameMetadata, FramePair, PixelFormat, RawFrame, StreamKind};
pub use synthetic::SyntheticDevice;
