// Module exports for pure logic (no filesystem or network access)
pub mod autosave;      // Debounced saves + in-flight guard
pub mod chat_context;  // Token budget and prompt assembly
pub mod conversation;  // Chat transcript
pub mod events;        // Typed event bus
pub mod file_tree;     // Sidebar ordering
pub mod panes;         // Split view routing
pub mod tabs;          // Tab bookkeeping per pane
