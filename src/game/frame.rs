//! Frame building for the render collaborator

use serde::Serialize;

use super::engine::LocalSimulation;
use super::entity::{DrawKind, Drawable, Player};

/// Everything the renderer paints for one tick, back to front
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Frame {
    pub tick: u64,
    pub entities: Vec<Drawable>,
}

impl Frame {
    pub fn of_kind(&self, kind: DrawKind) -> impl Iterator<Item = &Drawable> {
        self.entities.iter().filter(move |d| d.kind == kind)
    }
}

/// Builds frames and counts ticks
#[derive(Debug, Default)]
pub struct FrameBuilder {
    tick: u64,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Local player first, then remote players, the power and the cursor on top
    pub fn build<'a>(
        &mut self,
        local: &LocalSimulation,
        remote: impl IntoIterator<Item = &'a Player>,
    ) -> Frame {
        self.tick += 1;

        let mut entities = vec![Drawable::player(local.player(), DrawKind::LocalPlayer)];
        entities.extend(
            remote
                .into_iter()
                .map(|p| Drawable::player(p, DrawKind::RemotePlayer)),
        );
        if let Some(power) = local.power() {
            entities.push(Drawable::power(power));
        }
        if let Some(cursor) = local.cursor() {
            entities.push(Drawable::cursor(cursor));
        }

        Frame {
            tick: self.tick,
            entities,
        }
    }
}
