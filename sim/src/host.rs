//! Collaborator interfaces implemented by the embedding host.

use std::collections::VecDeque;

use crate::net::protocol::CommandRecord;
use crate::render_view::RenderItem;

/// Draws one frame.
pub trait Renderer {
    fn draw(&mut self, items: &[RenderItem]);
}

/// Turns player input into commands.
pub trait InputHandler {
    fn poll_commands(&mut self) -> Vec<CommandRecord>;
}

/// Renderer that draws nothing.
#[derive(Debug, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn draw(&mut self, _items: &[RenderItem]) {}
}

/// Input source fed programmatically, one batch per poll.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    batches: VecDeque<Vec<CommandRecord>>,
}

impl ScriptedInput {
    pub fn push(&mut self, batch: Vec<CommandRecord>) {
        self.batches.push_back(batch);
    }
}

impl InputHandler for ScriptedInput {
    fn poll_commands(&mut self) -> Vec<CommandRecord> {
        self.batches.pop_front().unwrap_or_default()
    }
}
