//! Instance role transition table.
//!
//! All role writes are checked against this table before they reach the
//! database; an attempt outside it is an invariant violation, surfaced and
//! never auto-corrected.

use crate::models::InstanceRole;

/// Whether a role transition is legal.
pub fn can_transition(from: InstanceRole, to: InstanceRole) -> bool {
    use InstanceRole::*;

    matches!(
        (from, to),
        // Launch confirmation
        (Launching, RunningPrimary)
            | (Launching, RunningReplica)
            // Launch never confirmed
            | (Launching, Terminated)
            // Promotion path
            | (RunningReplica, Promoting)
            | (Promoting, RunningPrimary)
            // Rolled-back promotion: the prior primary stays primary
            | (Promoting, Zombie)
            // Failed promotion after confirmed launch
            | (RunningReplica, Zombie)
            | (RunningReplica, Terminated)
            // A switch or failover replaced the primary
            | (RunningPrimary, Zombie)
            | (RunningPrimary, Terminating)
            | (RunningPrimary, Terminated)
            // Shutdown paths
            | (Terminating, Terminated)
            | (Zombie, Terminated)
    )
}

/// Roles an instance can still leave.
pub fn is_terminal(role: InstanceRole) -> bool {
    matches!(role, InstanceRole::Terminated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_promotion_path() {
        assert!(can_transition(
            InstanceRole::RunningReplica,
            InstanceRole::Promoting
        ));
        assert!(can_transition(
            InstanceRole::Promoting,
            InstanceRole::RunningPrimary
        ));
    }

    #[test]
    fn test_rolled_back_promotion_goes_zombie() {
        assert!(can_transition(InstanceRole::Promoting, InstanceRole::Zombie));
        assert!(!can_transition(
            InstanceRole::Promoting,
            InstanceRole::RunningReplica
        ));
    }

    #[test]
    fn test_zombie_only_exit_is_terminated() {
        for to in InstanceRole::iter() {
            let legal = can_transition(InstanceRole::Zombie, to);
            assert_eq!(legal, to == InstanceRole::Terminated, "zombie → {}", to);
        }
    }

    #[test]
    fn test_terminated_is_final() {
        assert!(is_terminal(InstanceRole::Terminated));
        for to in InstanceRole::iter() {
            assert!(
                !can_transition(InstanceRole::Terminated, to),
                "terminated must not transition to {}",
                to
            );
        }
    }

    #[test]
    fn test_no_transition_creates_second_primary_from_primary() {
        // A primary can never move sideways into another primary-ish role
        assert!(!can_transition(
            InstanceRole::RunningPrimary,
            InstanceRole::Promoting
        ));
        assert!(!can_transition(
            InstanceRole::RunningPrimary,
            InstanceRole::RunningReplica
        ));
    }
}
