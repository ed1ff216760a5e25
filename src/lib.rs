//! Interactive terminal text buffer engine.
//!
//! This crate owns the logical text, cursor, undo/redo history, the
//! word-and-line editing command set (including a vim-style subset), and a
//! visual layout engine that maps logical text -- possibly containing
//! embedded transformations such as collapsed image paths and paste
//! placeholders -- to wrapped visual lines.
//!
//! The render layer, clipboard I/O, and external-editor process launch are
//! the only pieces that talk to the outside world; everything else here is
//! pure and synchronous.

mod error;
mod host;
mod key;
mod layout;
mod paste;
mod state;
mod transform;
mod unicode;
mod vim;
mod word;

pub mod external_editor;

pub use error::EditorError;
pub use error::Feedback;
pub use error::FeedbackKind;
pub use host::BufferConfig;
pub use host::HostAdapter;
pub use key::Command;
pub use key::KeyCode;
pub use key::KeyEvent;
pub use key::Modifiers;
pub use layout::Layout;
pub use layout::VisualCursor;
pub use paste::ExpandedPaste;
pub use paste::PasteRegistry;
pub use state::Action;
pub use state::BufferState;
pub use state::CursorPosition;
pub use state::MoveDir;
pub use transform::Transformation;
pub use transform::TransformationType;
