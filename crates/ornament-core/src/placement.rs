//! Add-mode placement picking, ornament selection, and form submission

use glam::Vec3;
use rand::Rng;

use crate::error::FormError;
use crate::ornament::{Ornament, OrnamentId, OrnamentRef, DEFAULT_COUNTRY};
use crate::tree::{TreeHit, TreeShape};

/// Where the next submitted ornament goes
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Placement {
    /// No pick pending; submissions get a random position on the tree
    #[default]
    Idle,
    /// Waiting for a click on the tree
    Picking,
    /// A point was picked and is shown as a preview until submitted
    Confirmed(Vec3),
}

impl Placement {
    /// Enter picking mode. Any previously confirmed point is dropped.
    pub fn begin_picking(&mut self) {
        *self = Placement::Picking;
    }

    /// Leave picking mode without choosing a point
    pub fn cancel(&mut self) {
        if self.is_picking() {
            *self = Placement::Idle;
        }
    }

    /// Record a click on the tree. Only has an effect while picking.
    ///
    /// Returns the confirmed placement, offset off the surface.
    pub fn confirm(&mut self, hit: TreeHit) -> Option<Vec3> {
        if !self.is_picking() {
            return None;
        }
        let point = hit.placement();
        *self = Placement::Confirmed(point);
        Some(point)
    }

    /// Consume the confirmed point, if any, returning to idle.
    ///
    /// Picking stays active until a click lands on the tree.
    pub fn take(&mut self) -> Option<Vec3> {
        match *self {
            Placement::Confirmed(point) => {
                *self = Placement::Idle;
                Some(point)
            }
            _ => None,
        }
    }

    pub fn is_picking(&self) -> bool {
        matches!(self, Placement::Picking)
    }

    /// Point to render the preview marker at
    pub fn preview(&self) -> Option<Vec3> {
        match self {
            Placement::Confirmed(point) => Some(*point),
            _ => None,
        }
    }
}

/// Currently selected ornament for the detail popup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection(Option<OrnamentRef>);

impl Selection {
    /// Select an ornament, replacing any previous selection
    pub fn select(&mut self, target: OrnamentRef) {
        self.0 = Some(target);
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }

    pub fn current(&self) -> Option<OrnamentRef> {
        self.0
    }
}

/// Contents of the submission form
#[derive(Debug, Clone, PartialEq)]
pub struct OrnamentForm {
    pub country: String,
    pub message: String,
}

impl Default for OrnamentForm {
    fn default() -> Self {
        Self {
            country: DEFAULT_COUNTRY.to_string(),
            message: String::new(),
        }
    }
}

impl OrnamentForm {
    /// Turn the form into a new ornament.
    ///
    /// Uses the confirmed placement if there is one (returning the picker to
    /// idle), otherwise a random spot on the tree. A picker still waiting for
    /// a click keeps waiting. The message field is
    /// cleared and the country kept. An empty message leaves everything
    /// untouched.
    pub fn submit<R: Rng + ?Sized>(
        &mut self,
        placement: &mut Placement,
        shape: &TreeShape,
        rng: &mut R,
    ) -> Result<Ornament, FormError> {
        if self.message.trim().is_empty() {
            return Err(FormError::EmptyMessage);
        }

        let position = placement
            .take()
            .unwrap_or_else(|| shape.random_placement(rng));
        let message = std::mem::take(&mut self.message);

        Ok(Ornament::new(position, self.country.clone(), message).with_id(OrnamentId::random(rng)))
    }
}
