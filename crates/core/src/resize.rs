/// Pointer state of a split handle. Moves are only tracked while dragging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        last_pointer: u16,
    },
}

/// A draggable divider whose position is clamped to `[min, max]`.
///
/// Each move applies the delta since the previous pointer event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitResize {
    position: u16,
    min: u16,
    max: u16,
    drag: DragState,
}

impl SplitResize {
    #[must_use]
    pub fn new(position: u16, min: u16, max: u16) -> Self {
        let max = max.max(min);
        Self {
            position: position.clamp(min, max),
            min,
            max,
            drag: DragState::Idle,
        }
    }

    #[must_use]
    pub fn position(&self) -> u16 {
        self.position
    }

    #[must_use]
    pub fn drag_state(&self) -> DragState {
        self.drag
    }

    #[must_use]
    pub fn is_dragging(&self) -> bool {
        matches!(self.drag, DragState::Dragging { .. })
    }

    /// Narrows or widens the allowed range, re-clamping the position.
    pub fn set_bounds(&mut self, min: u16, max: u16) {
        self.min = min;
        self.max = max.max(min);
        self.position = self.position.clamp(self.min, self.max);
    }

    pub fn pointer_down(&mut self, pointer: u16) {
        self.drag = DragState::Dragging {
            last_pointer: pointer,
        };
    }

    /// Returns the new position when the move changed it.
    pub fn pointer_move(&mut self, pointer: u16) -> Option<u16> {
        let DragState::Dragging { last_pointer } = self.drag else {
            return None;
        };
        self.drag = DragState::Dragging {
            last_pointer: pointer,
        };

        let delta = i32::from(pointer) - i32::from(last_pointer);
        let next = (i32::from(self.position) + delta)
            .clamp(i32::from(self.min), i32::from(self.max));
        let next = u16::try_from(next).unwrap_or(self.position);
        if next == self.position {
            return None;
        }
        self.position = next;
        Some(next)
    }

    /// Ends the drag. Returns the final position if a drag was active.
    pub fn pointer_up(&mut self) -> Option<u16> {
        match std::mem::take(&mut self.drag) {
            DragState::Dragging { .. } => Some(self.position),
            DragState::Idle => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DragState, SplitResize};

    #[test]
    fn moves_are_ignored_while_idle() {
        let mut split = SplitResize::new(50, 10, 90);

        assert_eq!(split.pointer_move(70), None);
        assert_eq!(split.position(), 50);
        assert_eq!(split.pointer_up(), None);
    }

    #[test]
    fn drag_accumulates_relative_deltas() {
        let mut split = SplitResize::new(50, 10, 90);

        split.pointer_down(20);
        assert_eq!(split.drag_state(), DragState::Dragging { last_pointer: 20 });
        assert_eq!(split.pointer_move(25), Some(55));
        assert_eq!(split.pointer_move(22), Some(52));
        assert_eq!(split.pointer_up(), Some(52));

        assert_eq!(split.drag_state(), DragState::Idle);
        assert_eq!(split.pointer_move(40), None);
        assert_eq!(split.position(), 52);
    }

    #[test]
    fn position_is_clamped_to_bounds() {
        let mut split = SplitResize::new(15, 10, 20);

        split.pointer_down(0);
        assert_eq!(split.pointer_move(30), Some(20));
        assert_eq!(split.pointer_move(31), None);
        assert_eq!(split.pointer_move(0), Some(10));
        split.pointer_up();

        assert_eq!(SplitResize::new(200, 10, 20).position(), 20);
    }

    #[test]
    fn shrinking_bounds_reclamps_position() {
        let mut split = SplitResize::new(80, 10, 90);
        split.set_bounds(10, 40);
        assert_eq!(split.position(), 40);

        split.set_bounds(50, 30);
        assert_eq!(split.position(), 50);
    }
}
