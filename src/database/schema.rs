// Database schema definitions and migrations
// The audit log table and its append-only triggers live in one migration.

pub const AUDIT_LOG_SCHEMA: &str = include_str!("../../migrations/001_audit_log.sql");

pub const AUDIT_LOG_COLUMNS: &str = "seq, id, timestamp, format_version, event_type, actor_id, action, \
     resource_type, resource_id, details, ip_address, user_agent, previous_hash, hash, signature";
