//! Stable exit codes for voyage CLI commands.

/// Command succeeded; for `plan`, the run finalized and evaluated `good`.
pub const OK: i32 = 0;
/// Invalid input, config, or plan file, or an orchestration invariant broke.
pub const INVALID: i32 = 1;
/// The run stopped to ask the user clarifying questions.
pub const USER_INPUT_REQUIRED: i32 = 2;
/// The loop guard tripped before the plan completed.
pub const MAX_ITERS: i32 = 3;
/// The run finalized but the evaluation was `failed` or `needs_work`.
pub const EVALUATION_FAILED: i32 = 4;
