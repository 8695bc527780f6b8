// =============================================================================
// DEPLOY CONTROLLER DEFAULTS
// =============================================================================

/// Phrase a caller must send verbatim to start a production deploy
pub const CONFIRMATION_PHRASE: &str = "hell yeah ship it";

/// Maximum number of entries kept in a controller's audit ring
pub const LOG_LIMIT: usize = 300;

/// Number of trailing log entries returned with a run result
pub const RUN_LOG_TAIL: usize = 50;

/// Actor recorded when the caller does not name one
pub const DEFAULT_ACTOR: &str = "admin";

/// Actor names are truncated to this many characters
pub const MAX_ACTOR_LEN: usize = 120;

pub const DEFAULT_PLAN_TIER: &str = "pro";

pub const DEFAULT_BILLING_STATUS: &str = "active";

/// Built-in daily deploy ceilings per plan tier
pub const DEFAULT_TIER_LIMITS: [(&str, u32); 5] = [
    ("free", 1),
    ("starter", 3),
    ("pro", 10),
    ("business", 25),
    ("enterprise", 1000),
];

// =============================================================================
// QUOTA REJECTION REASONS
// =============================================================================

pub const REASON_BILLING_INACTIVE: &str = "billing_inactive";

pub const REASON_DAILY_LIMIT_EXCEEDED: &str = "daily_limit_exceeded";

// =============================================================================
// IDENTITY HEADERS
// =============================================================================

/// Fallback user id when no identity header is present
pub const ANONYMOUS_USER: &str = "anonymous";

/// Fallback client address when no forwarding header is present
pub const UNKNOWN_IP: &str = "unknown";

pub const USER_ID_HEADER: &str = "x-user-id";
