//! Consecutive-denial streak and intrusion flag bookkeeping.
//!
//! Every function here is a pure transition over [`AttemptState`]: no clock,
//! no I/O. The intrusion flag is raised by [`on_permission_denied`] but only
//! ever cleared by [`clear_intrusion`], which the session calls when the
//! alert's display window has elapsed.
//!
//! # Example
//!
//! ```rust
//! use vigil_runtime::attempt_tracker::{on_granted, on_permission_denied};
//! use vigil_types::AttemptState;
//!
//! let state = AttemptState::default();
//! let (state, tripped) = on_permission_denied(state, 3);
//! assert!(!tripped);
//! let (state, tripped) = on_permission_denied(state, 3);
//! assert!(!tripped);
//! let (state, tripped) = on_permission_denied(state, 3); // third in a row
//! assert!(tripped && state.intrusion_active);
//! assert_eq!(state.consecutive_denials, 0);
//!
//! assert_eq!(on_granted(state).consecutive_denials, 0);
//! ```

use vigil_types::AttemptState;

/// A granted outcome breaks the streak. The intrusion flag is time-driven
/// and left as is.
pub fn on_granted(state: AttemptState) -> AttemptState {
    AttemptState {
        consecutive_denials: 0,
        ..state
    }
}

/// Count one "no permission for this zone" denial.
///
/// Returns the new state and `true` when this denial reached `threshold`;
/// the streak then restarts from zero with the intrusion flag raised.
/// A `threshold` of 0 behaves like 1.
pub fn on_permission_denied(state: AttemptState, threshold: u32) -> (AttemptState, bool) {
    let denials = state.consecutive_denials.saturating_add(1);
    if denials >= threshold.max(1) {
        (
            AttemptState {
                consecutive_denials: 0,
                intrusion_active: true,
            },
            true,
        )
    } else {
        (
            AttemptState {
                consecutive_denials: denials,
                ..state
            },
            false,
        )
    }
}

/// Other denials, retries and transport errors never touch the streak.
pub fn on_other_outcome(state: AttemptState) -> AttemptState {
    state
}

pub fn clear_intrusion(state: AttemptState) -> AttemptState {
    AttemptState {
        intrusion_active: false,
        ..state
    }
}
