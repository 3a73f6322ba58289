//! Typed error hierarchy for the flow engine.
//!
//! Uses `thiserror` for library-grade errors.  Application code should wrap
//! these in `anyhow::Result` at call sites.
//!
//! Driver status codes are converted into this taxonomy at the single point
//! where the optical-flow interface is called (`flowviz-nvof::sys`); nothing
//! above that boundary sees a raw status integer.

/// All errors originating from the flowviz engine.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    // ── Driver binding ────────────────────────────────────────────────
    #[error("optical flow engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error(
        "driver supports optical flow API {driver_major}.{driver_minor} at most, \
         this build requires {compiled_major}.{compiled_minor}"
    )]
    UnsupportedVersion {
        driver_major: u32,
        driver_minor: u32,
        compiled_major: u32,
        compiled_minor: u32,
    },

    // ── Device / session ──────────────────────────────────────────────
    #[error("unsupported device: {0}")]
    UnsupportedDevice(String),

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("invalid struct version: {0}")]
    InvalidVersion(String),

    #[error("out of device memory: {0}")]
    OutOfMemory(String),

    #[error("session not initialized: {0}")]
    NotInitialized(String),

    // ── CUDA ──────────────────────────────────────────────────────────
    #[error("CUDA driver error: {0}")]
    Cuda(#[from] cudarc::driver::DriverError),

    #[error("{call} failed with CUDA error code {code}")]
    CudaCall { call: &'static str, code: i32 },

    // ── I/O boundaries ────────────────────────────────────────────────
    #[error("frame source error: {0}")]
    Source(String),

    #[error("image sink error: {0}")]
    Sink(String),

    // ── Unclassified driver failure ───────────────────────────────────
    #[error("optical flow driver error: {0}")]
    Generic(String),
}

impl FlowError {
    /// Append driver-reported detail text to the message, keeping the
    /// variant (and therefore the error code) intact.
    #[must_use]
    pub fn with_detail(self, detail: &str) -> Self {
        let extend = |msg: String| format!("{msg}; driver reports: {detail}");
        match self {
            Self::EngineUnavailable(m) => Self::EngineUnavailable(extend(m)),
            Self::UnsupportedDevice(m) => Self::UnsupportedDevice(extend(m)),
            Self::DeviceNotFound(m) => Self::DeviceNotFound(extend(m)),
            Self::InvalidParam(m) => Self::InvalidParam(extend(m)),
            Self::InvalidVersion(m) => Self::InvalidVersion(extend(m)),
            Self::OutOfMemory(m) => Self::OutOfMemory(extend(m)),
            Self::NotInitialized(m) => Self::NotInitialized(extend(m)),
            Self::Source(m) => Self::Source(extend(m)),
            Self::Sink(m) => Self::Sink(extend(m)),
            Self::Generic(m) => Self::Generic(extend(m)),
            // No string payload to extend.
            other => other,
        }
    }

    /// Stable integer error code for structured telemetry.
    ///
    /// Codes are grouped by category:
    /// - 1xx: driver binding
    /// - 2xx: device / session
    /// - 3xx: CUDA
    /// - 4xx: I/O boundaries
    /// - 5xx: unclassified
    pub fn error_code(&self) -> u32 {
        match self {
            Self::EngineUnavailable(_) => 100,
            Self::UnsupportedVersion { .. } => 101,
            Self::UnsupportedDevice(_) => 200,
            Self::DeviceNotFound(_) => 201,
            Self::InvalidParam(_) => 202,
            Self::InvalidVersion(_) => 203,
            Self::OutOfMemory(_) => 204,
            Self::NotInitialized(_) => 205,
            Self::Cuda(_) => 300,
            Self::CudaCall { .. } => 301,
            Self::Source(_) => 400,
            Self::Sink(_) => 401,
            Self::Generic(_) => 500,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_mismatch_message_names_both_versions() {
        let err = FlowError::UnsupportedVersion {
            driver_major: 4,
            driver_minor: 1,
            compiled_major: 5,
            compiled_minor: 0,
        };
        let msg = err.to_string();
        assert!(msg.contains("4.1"), "driver version missing: {msg}");
        assert!(msg.contains("5.0"), "compiled version missing: {msg}");
    }

    #[test]
    fn with_detail_keeps_variant_and_code() {
        let err = FlowError::InvalidParam("nvOFInit: NV_OF_ERR_INVALID_PARAM (code 5)".into())
            .with_detail("outGridSize not supported");
        assert!(matches!(err, FlowError::InvalidParam(_)), "{err}");
        assert_eq!(err.error_code(), 202);
        assert!(err.to_string().contains("outGridSize not supported"));

        let err = FlowError::OutOfMemory("nvOFCreateGPUBufferCuda".into()).with_detail("d");
        assert_eq!(err.error_code(), 204);

        // Variants without a message payload pass through untouched.
        let err = FlowError::CudaCall {
            call: "cuMemcpy2DAsync",
            code: 2,
        }
        .with_detail("ignored");
        assert_eq!(err.error_code(), 301);
    }

    #[test]
    fn error_codes_are_grouped_by_category() {
        assert_eq!(FlowError::EngineUnavailable(String::new()).error_code(), 100);
        assert_eq!(FlowError::InvalidParam(String::new()).error_code(), 202);
        assert_eq!(
            FlowError::CudaCall {
                call: "cuMemcpy2DAsync",
                code: 1
            }
            .error_code(),
            301
        );
    }
}
