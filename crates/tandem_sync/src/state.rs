//! Reconciliation driver state machine.

use std::fmt;

/// Direction of a single merge pass within a file pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Rows flow from the side A copy into the side B copy.
    AToB,
    /// Rows flow from the side B copy into the side A copy.
    BToA,
}

impl Direction {
    /// The opposite direction.
    pub fn reverse(&self) -> Direction {
        match self {
            Direction::AToB => Direction::BToA,
            Direction::BToA => Direction::AToB,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::AToB => write!(f, "A->B"),
            Direction::BToA => write!(f, "B->A"),
        }
    }
}

/// The (file, table, direction) tuple the driver is currently working.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStep {
    /// Database file name.
    pub file: String,
    /// Table name.
    pub table: String,
    /// Merge direction.
    pub direction: Direction,
}

impl TableStep {
    /// Creates a step.
    pub fn new(file: impl Into<String>, table: impl Into<String>, direction: Direction) -> Self {
        Self {
            file: file.into(),
            table: table.into(),
            direction,
        }
    }
}

impl fmt::Display for TableStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.file, self.table, self.direction)
    }
}

/// The current state of the reconciliation driver.
///
/// Transitions are `Idle → Scanning → Applying → Idle`, repeated
/// sequentially for each (file, table, direction) tuple; there is no
/// concurrency between tuples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverState {
    /// Not synchronizing.
    Idle,
    /// Collecting changed rows from the source copy.
    Scanning(TableStep),
    /// Writing changed rows into the target copy.
    Applying(TableStep),
}

impl DriverState {
    /// Returns true if the driver is working a tuple.
    pub fn is_active(&self) -> bool {
        !matches!(self, DriverState::Idle)
    }

    /// The step being worked, if any.
    pub fn step(&self) -> Option<&TableStep> {
        match self {
            DriverState::Idle => None,
            DriverState::Scanning(step) | DriverState::Applying(step) => Some(step),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_reverse() {
        assert_eq!(Direction::AToB.reverse(), Direction::BToA);
        assert_eq!(Direction::BToA.reverse(), Direction::AToB);
    }

    #[test]
    fn state_predicates() {
        let step = TableStep::new("hierarchy.db", "employees", Direction::AToB);
        assert!(!DriverState::Idle.is_active());
        assert!(DriverState::Scanning(step.clone()).is_active());
        assert!(DriverState::Applying(step.clone()).is_active());
        assert_eq!(DriverState::Idle.step(), None);
        assert_eq!(DriverState::Applying(step.clone()).step(), Some(&step));
    }

    #[test]
    fn step_display() {
        let step = TableStep::new("surveys.db", "surveys", Direction::BToA);
        assert_eq!(step.to_string(), "surveys.db/surveys B->A");
    }
}
