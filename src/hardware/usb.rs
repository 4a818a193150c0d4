//! Native USB capture backend using nokhwa.
//!
//! The nokhwa camera object is not `Send`, so each open device lives on its
//! own capture thread and the handle talks to it over a channel.
//!
//! Exposure goes to `exposure_absolute`, whose unit is 100 µs and which is
//! always positive. The static exposure range defaults (-13..0) do not fit
//! it; set `CAMERA_EXPOSURE_MIN/MAX/STEP` when running this backend.

use super::v4l2;
use super::{CaptureBackend, CaptureDevice, CaptureProperty, DeviceConfig, Frame, HardwareError, HwResult, PixelFormat};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, ControlValueDescription, ControlValueSetter, FrameFormat,
    KnownCameraControl, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;
use std::sync::mpsc;
use std::thread;

/// USB backend
#[derive(Debug, Clone, Default)]
pub struct UsbBackend;

impl UsbBackend {
    pub fn new() -> Self {
        Self
    }
}

enum Command {
    Read(mpsc::Sender<HwResult<Frame>>),
    Set(CaptureProperty, f64, mpsc::Sender<HwResult<()>>),
    Get(CaptureProperty, mpsc::Sender<HwResult<f64>>),
    Release(mpsc::Sender<HwResult<()>>),
}

fn control_for(property: CaptureProperty) -> KnownCameraControl {
    match property {
        CaptureProperty::Exposure => KnownCameraControl::Exposure,
        CaptureProperty::Gain => KnownCameraControl::Gain,
        CaptureProperty::Focus => KnownCameraControl::Focus,
        CaptureProperty::AutoExposure => KnownCameraControl::Other(v4l2::CID_EXPOSURE_AUTO),
        CaptureProperty::AutoFocus => KnownCameraControl::Other(v4l2::CID_FOCUS_AUTO),
    }
}

fn setter_for(property: CaptureProperty, value: f64) -> ControlValueSetter {
    match property {
        CaptureProperty::AutoExposure => ControlValueSetter::Integer(v4l2::exposure_mode(value)),
        CaptureProperty::AutoFocus => ControlValueSetter::Boolean(value != 0.0),
        _ => ControlValueSetter::Integer(value.round() as i64),
    }
}

fn numeric_value(description: ControlValueDescription) -> HwResult<f64> {
    match description {
        ControlValueDescription::Integer { value, .. } => Ok(value as f64),
        ControlValueDescription::IntegerRange { value, .. } => Ok(value as f64),
        ControlValueDescription::Float { value, .. } => Ok(value),
        ControlValueDescription::FloatRange { value, .. } => Ok(value),
        ControlValueDescription::Boolean { value, .. } => Ok(if value { 1.0 } else { 0.0 }),
        ControlValueDescription::Enum { value, .. } => Ok(value as f64),
        other => Err(HardwareError::Unsupported(format!("non-numeric control value {:?}", other))),
    }
}

fn open_camera(config: &DeviceConfig) -> HwResult<Camera> {
    let frame_format = match config.pixel_format {
        PixelFormat::Mjpg => FrameFormat::MJPEG,
        PixelFormat::Yuyv => FrameFormat::YUYV,
    };
    let format = CameraFormat::new(
        Resolution::new(config.width, config.height),
        frame_format,
        config.fps,
    );
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

    let mut camera = Camera::new(CameraIndex::Index(config.index), requested)
        .map_err(|e| HardwareError::NotReady(e.to_string()))?;
    camera
        .open_stream()
        .map_err(|e| HardwareError::NotReady(e.to_string()))?;
    Ok(camera)
}

fn capture_loop(mut camera: Camera, rx: mpsc::Receiver<Command>) {
    while let Ok(command) = rx.recv() {
        match command {
            Command::Read(reply) => {
                let result = camera
                    .frame()
                    .and_then(|buffer| buffer.decode_image::<RgbFormat>())
                    .map(|image| Frame::new(image.width(), image.height(), image.into_raw()))
                    .map_err(|e| HardwareError::ReadFailed(e.to_string()));
                let _ = reply.send(result);
            }
            Command::Set(property, value, reply) => {
                let result = camera
                    .set_camera_control(control_for(property), setter_for(property, value))
                    .map_err(|e| HardwareError::Unsupported(format!("{}: {}", property.as_str(), e)));
                let _ = reply.send(result);
            }
            Command::Get(property, reply) => {
                let result = camera
                    .camera_control(control_for(property))
                    .map_err(|e| HardwareError::Unsupported(format!("{}: {}", property.as_str(), e)))
                    .and_then(|control| numeric_value(control.value()))
                    .and_then(|raw| match property {
                        CaptureProperty::AutoExposure => v4l2::exposure_flag(raw as i64),
                        _ => Ok(raw),
                    });
                let _ = reply.send(result);
            }
            Command::Release(reply) => {
                let result = camera
                    .stop_stream()
                    .map_err(|e| HardwareError::Other(e.to_string()));
                let _ = reply.send(result);
                break;
            }
        }
    }
    tracing::debug!("USB capture thread exiting");
}

impl CaptureBackend for UsbBackend {
    fn name(&self) -> &'static str {
        "usb"
    }

    fn open(&self, config: &DeviceConfig) -> HwResult<Box<dyn CaptureDevice>> {
        let (tx, rx) = mpsc::channel::<Command>();
        let (ready_tx, ready_rx) = mpsc::channel::<HwResult<()>>();
        let config = config.clone();

        thread::Builder::new()
            .name(format!("usb-capture-{}", config.index))
            .spawn(move || match open_camera(&config) {
                Ok(camera) => {
                    let _ = ready_tx.send(Ok(()));
                    capture_loop(camera, rx);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| HardwareError::NotReady(format!("capture thread spawn failed: {}", e)))?;

        ready_rx
            .recv()
            .map_err(|_| HardwareError::NotReady("capture thread exited during open".to_string()))??;

        Ok(Box::new(UsbDevice { tx: Some(tx) }))
    }
}

struct UsbDevice {
    tx: Option<mpsc::Sender<Command>>,
}

impl UsbDevice {
    fn request<T>(&self, build: impl FnOnce(mpsc::Sender<HwResult<T>>) -> Command) -> HwResult<T> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| HardwareError::ReadFailed("device released".to_string()))?;
        let (reply_tx, reply_rx) = mpsc::channel();
        tx.send(build(reply_tx))
            .map_err(|_| HardwareError::Other("capture thread gone".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| HardwareError::Other("capture thread gone".to_string()))?
    }
}

impl CaptureDevice for UsbDevice {
    fn is_opened(&self) -> bool {
        self.tx.is_some()
    }

    fn read(&mut self) -> HwResult<Frame> {
        self.request(Command::Read)
    }

    fn set(&mut self, property: CaptureProperty, value: f64) -> HwResult<()> {
        self.request(|reply| Command::Set(property, value, reply))
    }

    fn get(&self, property: CaptureProperty) -> HwResult<f64> {
        self.request(|reply| Command::Get(property, reply))
    }

    fn release(&mut self) -> HwResult<()> {
        let result = self.request(Command::Release);
        self.tx = None;
        result
    }
}
