//! Rasterizer errors.
//!
//! Only pass setup can fail. Inside the pixel loop every failure degrades to
//! a skipped triangle or a discarded pixel.

use refract_debug::{DebugError, ShaderStage};
use thiserror::Error;

/// Raster result type alias.
pub type Result<T> = std::result::Result<T, RasterError>;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("render target is empty; call init first")]
    NotInitialized,

    #[error("failed to prepare the {stage} stage of pass `{pass}`")]
    Prepare {
        pass: String,
        stage: ShaderStage,
        #[source]
        source: DebugError,
    },
}
