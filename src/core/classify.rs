//! Request classification into priority lanes.

use crate::util::serde::PriorityLevel;

/// Transport-agnostic attributes the classifier inspects.
#[derive(Debug, Clone, Copy)]
pub struct RequestAttrs<'a> {
    /// Request path.
    pub path: &'a str,
    /// Request method name, any casing.
    pub method: &'a str,
    /// Whether the request asked for a protocol upgrade.
    pub upgrade_requested: bool,
}

/// Assigns a priority level to a request before admission.
pub trait Classify: Send + Sync {
    /// Classify one request. Must be pure and total: any input maps to one
    /// of the five levels.
    fn classify(&self, req: &RequestAttrs<'_>) -> PriorityLevel;
}

/// The server's built-in traffic rules, evaluated in order with first match
/// winning:
///
/// 1. health or security paths → Critical
/// 2. protocol upgrades, auth or login paths → High
/// 3. mutating methods (POST/PUT/DELETE) → Normal
/// 4. read methods on search or analytics paths → Low
/// 5. backup or maintenance paths → Background
/// 6. everything else → Normal
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl Classify for DefaultClassifier {
    fn classify(&self, req: &RequestAttrs<'_>) -> PriorityLevel {
        let path = req.path;
        if path.contains("/health") || path.contains("/security") {
            return PriorityLevel::Critical;
        }
        if req.upgrade_requested || path.contains("/auth") || path.contains("/login") {
            return PriorityLevel::High;
        }
        if is_mutation(req.method) {
            return PriorityLevel::Normal;
        }
        if is_read(req.method) && (path.contains("/search") || path.contains("/analytics")) {
            return PriorityLevel::Low;
        }
        if path.contains("/backup") || path.contains("/maintenance") {
            return PriorityLevel::Background;
        }
        PriorityLevel::Normal
    }
}

fn is_mutation(method: &str) -> bool {
    method.eq_ignore_ascii_case("POST")
        || method.eq_ignore_ascii_case("PUT")
        || method.eq_ignore_ascii_case("DELETE")
}

fn is_read(method: &str) -> bool {
    method.eq_ignore_ascii_case("GET") || method.eq_ignore_ascii_case("HEAD")
}
