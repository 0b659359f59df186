mod storage;
pub use storage::FileStorage;

#[cfg(feature = "cli")]
mod renderer;
#[cfg(feature = "cli")]
pub use renderer::CommandRenderer;
