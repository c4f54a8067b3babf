//! Synthetic identifiers shared between the encoder and the decoder
//!
//! The encoder injects assignments to these control variables into the
//! sequentialized program; the decoder recognizes them in the backend's
//! trace and classifies the surrounding state accordingly.

/// Prefix of every identifier injected by the pipeline.
pub const INTERNAL_PREFIX: &str = "__cs_";

/// Currently scheduled thread; an assignment marks a context switch.
pub const THREAD_INDEX: &str = "__cs_thread_index";

/// Id of a freshly created thread; an assignment marks a `pthread_create`.
pub const THREAD_CREATED: &str = "__cs_threadID";

/// Per-thread committed program counter array.
pub const PC: &str = "__cs_pc";

/// Per-thread guessed program counter bound array.
pub const PC_CS: &str = "__cs_pc_cs";

/// Per-thread active flag array.
pub const ACTIVE_THREAD: &str = "__cs_active_thread";

/// Per-thread size (visible statement count) array.
pub const THREAD_LINES: &str = "__cs_thread_lines";

/// Index of the last thread to run (deadlock check bookkeeping).
pub const LAST_THREAD: &str = "__cs_last_thread";

/// Per-thread start routine argument array.
pub const THREAD_ARGS: &str = "__cs_threadargs";

/// Stand-in callee for `pthread_join` calls past the thread bound.
pub const NOOP: &str = "__cs_noop";

/// Condition variable being signalled.
pub const COND_TO_SIGNAL: &str = "__cs_cond_to_signal";

/// Condition variable being waited for.
pub const COND_TO_WAIT_FOR: &str = "__cs_cond_to_wait_for";

/// Mutex being acquired.
pub const MUTEX_TO_LOCK: &str = "__cs_mutex_to_lock";

/// Mutex being released.
pub const MUTEX_TO_UNLOCK: &str = "__cs_mutex_to_unlock";

/// Mutex being destroyed.
pub const MUTEX_TO_DESTROY: &str = "__cs_mutex_to_destroy";

/// Explicit user-visible message channel (never filtered out).
pub const MESSAGE: &str = "__cs_message";

/// Branch decision temporaries (extra tracking only).
pub const IF_COND_PREFIX: &str = "__cs_tmp_if_cond_";

/// Loop decision temporaries (extra tracking only).
pub const LOOP_PREFIX: &str = "__cs_loop_";

/// Loop unwinding sentinel; a violated assertion over it means the bound
/// was too small, not that the property fails.
pub const LOOP_CHECK: &str = "__cs_loop_check";

/// Scope-renamed local variables: `__cs_local_<function>_<name>`.
pub const LOCAL_PREFIX: &str = "__cs_local_";

/// Scope-renamed function parameters: `__cs_param_<function>_<name>`.
pub const PARAM_PREFIX: &str = "__cs_param_";

/// Thread-local storage arrays are exempt from the global-access check.
pub const THREAD_LOCAL_PREFIX: &str = "__cs_thread_local_";

/// The per-context thread selector array (context-bounded mode).
pub const TID: &str = "__cs_tid";

/// The per-context jump bound array (context-bounded mode).
pub const CS: &str = "__cs_cs";
