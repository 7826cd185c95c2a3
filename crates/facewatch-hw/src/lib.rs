//! facewatch-hw: camera capture for the recognition loop.
//!
//! Provides V4L2-based camera access that yields RGB frames from YUYV or
//! MJPEG devices.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, CameraStream, DeviceInfo, FrameSource, PixelFormat};
pub use frame::Frame;
