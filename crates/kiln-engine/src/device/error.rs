use std::fmt;
use std::time::Duration;

/// High-level response after a back-buffer acquisition error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; rendering may resume next frame.
    Reconfigured,
    /// Transient error; skip the current frame.
    SkipFrame,
    /// Fatal error (commonly OOM); terminate gracefully.
    Fatal,
}

/// Errors reported by the frame execution context.
///
/// Environment failures during device creation are reported through `anyhow`
/// by [`crate::device::DeviceContext::new`]; everything that can go wrong once
/// the context is running lands here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A `FrameConfig` value is out of range.
    InvalidConfig(&'static str),

    /// `alloc_upload(0)`.
    ZeroSizedUpload,

    /// The current slot's upload arena cannot fit the request.
    ///
    /// This is a configuration error: `upload_capacity` must be raised.
    UploadExhausted {
        requested: u64,
        aligned: u64,
        remaining: u64,
        capacity: u64,
    },

    /// More bytes were written into an upload region than it was allocated with.
    UploadRegionOverflow { size: u64, written: u64 },

    /// More command lists were opened in one batch than the pool allows.
    CommandListCapExceeded { cap: usize },

    /// The handle does not name an open command list.
    CommandListNotOpen { index: usize },

    /// The handle was issued for an earlier batch.
    StaleCommandList { index: usize },

    /// `flush` found a list that was never closed.
    CommandListStillOpen { index: usize },

    /// Recording or submission was attempted outside `begin_frame`/`present`.
    NoFrameInProgress,

    /// `begin_frame` or `resize_check` was called while a frame was open.
    FrameInProgress,

    /// Every slot of the resource-view table is taken.
    ViewTableFull { capacity: u32 },

    /// The index does not name a live resource view.
    InvalidViewIndex(u32),

    /// A bounded fence wait expired.
    FenceTimeout { value: u64, timeout: Duration },

    /// The next back buffer could not be acquired; skip the frame.
    SurfaceUnavailable,

    /// The presentation engine ran out of memory.
    SurfaceOutOfMemory,

    /// The device was removed or reset. The context must be rebuilt.
    DeviceLost(String),

    /// Any other backend failure.
    Backend(String),
}

impl FrameError {
    /// Returns `true` when the error cannot be recovered by skipping a frame.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            FrameError::SurfaceUnavailable | FrameError::FenceTimeout { .. }
        )
    }
}

impl From<SurfaceErrorAction> for FrameError {
    fn from(action: SurfaceErrorAction) -> Self {
        match action {
            SurfaceErrorAction::Reconfigured | SurfaceErrorAction::SkipFrame => {
                FrameError::SurfaceUnavailable
            }
            SurfaceErrorAction::Fatal => FrameError::SurfaceOutOfMemory,
        }
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::InvalidConfig(msg) => write!(f, "invalid frame configuration: {msg}"),
            FrameError::ZeroSizedUpload => write!(f, "upload allocation of zero bytes"),
            FrameError::UploadExhausted {
                requested,
                aligned,
                remaining,
                capacity,
            } => write!(
                f,
                "upload memory exhausted: requested {requested} bytes ({aligned} aligned), \
                 remaining {remaining} of {capacity} bytes; increase upload_capacity"
            ),
            FrameError::UploadRegionOverflow { size, written } => write!(
                f,
                "wrote {written} bytes into an upload region of {size} bytes"
            ),
            FrameError::CommandListCapExceeded { cap } => write!(
                f,
                "more than {cap} command lists requested in one batch; increase command_list_cap"
            ),
            FrameError::CommandListNotOpen { index } => {
                write!(f, "command list {index} is not open for recording")
            }
            FrameError::StaleCommandList { index } => {
                write!(f, "command list handle {index} belongs to an already submitted batch")
            }
            FrameError::CommandListStillOpen { index } => {
                write!(f, "command list {index} was not closed before flush")
            }
            FrameError::NoFrameInProgress => write!(f, "no frame in progress; call begin_frame first"),
            FrameError::FrameInProgress => write!(f, "a frame is already in progress"),
            FrameError::ViewTableFull { capacity } => write!(
                f,
                "resource view table is full ({capacity} slots); increase view_table_capacity"
            ),
            FrameError::InvalidViewIndex(index) => write!(f, "no resource view at index {index}"),
            FrameError::FenceTimeout { value, timeout } => {
                write!(f, "fence value {value} not reached within {timeout:?}")
            }
            FrameError::SurfaceUnavailable => write!(f, "surface back buffer unavailable"),
            FrameError::SurfaceOutOfMemory => write!(f, "surface out of memory"),
            FrameError::DeviceLost(reason) => write!(f, "GPU device lost: {reason}"),
            FrameError::Backend(msg) => write!(f, "GPU backend error: {msg}"),
        }
    }
}

impl std::error::Error for FrameError {}
