//! Head Morph Scripting
//!
//! JavaScript access to the morph system via QuickJS.
//!
//! ## Architecture
//!
//! - **Runtime:** one [`ScriptRuntime`] per script environment
//! - **Natives:** the five morph entry points bound as JS globals, sharing
//!   the [`MorphSystem`](headmorph_core::MorphSystem) through `Rc<RefCell<_>>`
//! - **Handles:** characters cross the boundary as 32-bit script guids

pub mod error;
pub mod natives;
pub mod runtime;

pub use error::ScriptError;
pub use natives::install_natives;
pub use runtime::ScriptRuntime;

pub use rquickjs;
