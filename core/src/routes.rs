//! Static route registry and target resolution with role-aware ranking.

use serde::Serialize;
use utoipa::ToSchema;

use crate::fuzzy::{LOOSE_THRESHOLD, best_fuzzy, similarity};
use crate::normalize::collapse_whitespace;
use crate::policy::{Identity, can_access, role_namespace};

pub const MAX_SUGGESTIONS: usize = 5;
/// Minimum ranking score for a suggestion to be offered.
pub const SUGGESTION_FLOOR: f64 = 0.6;
const ROLE_BOOST: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouteEntry {
    pub key: &'static str,
    pub path: &'static str,
}

const fn route(key: &'static str, path: &'static str) -> RouteEntry {
    RouteEntry { key, path }
}

pub static ROUTES: &[RouteEntry] = &[
    route("dashboard", "/admin/dashboard"),
    route("students", "/admin/students"),
    route("add student", "/admin/students/new"),
    route("teachers", "/admin/teachers"),
    route("classes", "/admin/classes"),
    route("subjects", "/admin/subjects"),
    route("exams", "/admin/exams"),
    route("create exam", "/admin/exams/new"),
    route("results", "/admin/results"),
    route("report cards", "/admin/report-cards"),
    route("timetable", "/admin/timetable"),
    route("attendance", "/admin/attendance"),
    route("users", "/admin/users"),
    route("academic years", "/admin/academic-years"),
    route("terms", "/admin/terms"),
    route("announcements", "/admin/announcements"),
    route("events", "/admin/events"),
    route("analytics", "/admin/analytics"),
    route("teacher dashboard", "/teacher/dashboard"),
    route("my classes", "/teacher/classes"),
    route("enter results", "/teacher/results"),
    route("gradebook", "/teacher/gradebook"),
    route("lesson plans", "/teacher/lesson-plans"),
    route("take attendance", "/teacher/attendance"),
    route("my timetable", "/teacher/timetable"),
    route("finance dashboard", "/finance/dashboard"),
    route("fees", "/finance/fees"),
    route("fee structure", "/finance/fee-structure"),
    route("invoices", "/finance/invoices"),
    route("payments", "/finance/payments"),
    route("arrears", "/finance/arrears"),
    route("expenses", "/finance/expenses"),
    route("receipts", "/finance/receipts"),
    route("fee reminders", "/finance/reminders"),
    route("financial reports", "/finance/reports"),
    route("student dashboard", "/student/dashboard"),
    route("my results", "/student/results"),
    route("my fees", "/student/fees"),
    route("assignments", "/student/assignments"),
    route("settings", "/settings"),
    route("profile", "/profile"),
    route("messages", "/messages"),
    route("notifications", "/notifications"),
    route("help", "/help"),
];

/// One ranked destination.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Suggestion {
    pub key: String,
    pub path: String,
    pub score: f64,
    pub allowed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// A single confident destination the identity may open.
    Resolved(&'static RouteEntry),
    /// A single confident destination the identity may not open.
    Denied(&'static RouteEntry),
    /// No confident match; allowed candidates ranked best first (may be empty).
    Suggestions(Vec<Suggestion>),
}

fn role_boost(entry: &RouteEntry, identity: &Identity) -> f64 {
    match role_namespace(identity.role) {
        Some(namespace) if entry.path.starts_with(namespace) => ROLE_BOOST,
        _ => 0.0,
    }
}

fn accept(entry: &'static RouteEntry, identity: &Identity) -> Resolution {
    if can_access(identity, entry.path) {
        Resolution::Resolved(entry)
    } else {
        Resolution::Denied(entry)
    }
}

pub fn find_route(key: &str) -> Option<&'static RouteEntry> {
    ROUTES.iter().find(|entry| entry.key == key)
}

/// Highest `keyLength/100 + roleBoost`; earlier candidates win ties.
fn best_scored(
    candidates: impl Iterator<Item = &'static RouteEntry>,
    identity: &Identity,
) -> Option<&'static RouteEntry> {
    let score = |entry: &RouteEntry| entry.key.len() as f64 / 100.0 + role_boost(entry, identity);
    candidates.fold(None, |best, entry| match best {
        Some(current) if score(current) >= score(entry) => Some(current),
        _ => Some(entry),
    })
}

/// Resolve a free-text target phrase to a destination.
pub fn resolve(target: &str, identity: &Identity) -> Resolution {
    let target = collapse_whitespace(&target.to_lowercase());
    if target.is_empty() {
        return Resolution::Suggestions(Vec::new());
    }

    if let Some(entry) = find_route(&target) {
        tracing::debug!(target = %target, key = entry.key, "route resolved by exact key");
        return accept(entry, identity);
    }

    let mut contained: Vec<&'static RouteEntry> = ROUTES
        .iter()
        .filter(|entry| target.contains(entry.key) || entry.key.contains(target.as_str()))
        .collect();
    contained.sort_by_key(|entry| std::cmp::Reverse(entry.key.len()));

    match contained.as_slice() {
        [only] => {
            tracing::debug!(target = %target, key = only.key, "route resolved by containment");
            return accept(only, identity);
        }
        [] => {
            let first_token = target.split(' ').next().unwrap_or_default();
            let hit = best_fuzzy(&target, ROUTES.iter().map(|e| e.key), LOOSE_THRESHOLD)
                .or_else(|| best_fuzzy(first_token, ROUTES.iter().map(|e| e.key), LOOSE_THRESHOLD));
            if let Some(entry) = hit.and_then(|hit| find_route(hit.candidate)) {
                tracing::debug!(target = %target, key = entry.key, "route resolved by fuzzy match");
                return accept(entry, identity);
            }
        }
        several => {
            let allowed = best_scored(
                several
                    .iter()
                    .copied()
                    .filter(|entry| can_access(identity, entry.path)),
                identity,
            );
            if let Some(entry) = allowed {
                tracing::debug!(target = %target, key = entry.key, "route disambiguated");
                return Resolution::Resolved(entry);
            }
            if let Some(entry) = best_scored(several.iter().copied(), identity) {
                return Resolution::Denied(entry);
            }
        }
    }

    let ranked: Vec<Suggestion> = suggest(&target, identity)
        .into_iter()
        .filter(|s| s.allowed && s.score >= SUGGESTION_FLOOR)
        .take(MAX_SUGGESTIONS)
        .collect();
    tracing::debug!(target = %target, suggestions = ranked.len(), "route unresolved");
    Resolution::Suggestions(ranked)
}

/// Score every registry entry against `target`, best first. Includes entries
/// the identity may not open (`allowed: false`).
pub fn suggest(target: &str, identity: &Identity) -> Vec<Suggestion> {
    let target = collapse_whitespace(&target.to_lowercase());
    let first_token = target.split(' ').next().unwrap_or_default();
    let indicator = |hit: bool, weight: f64| if hit { weight } else { 0.0 };

    let mut ranked: Vec<Suggestion> = ROUTES
        .iter()
        .map(|entry| {
            let key = entry.key;
            let fuzzy_whole = indicator(similarity(&target, key) >= LOOSE_THRESHOLD, 0.5);
            let fuzzy_first = indicator(similarity(first_token, key) >= LOOSE_THRESHOLD, 0.3);
            let score = indicator(target.contains(key), 1.0)
                + indicator(!target.is_empty() && key.contains(target.as_str()), 0.9)
                + indicator(!first_token.is_empty() && first_token.contains(key), 0.4)
                + fuzzy_whole.max(fuzzy_first)
                + role_boost(entry, identity)
                + key.len().min(30) as f64 / 300.0;
            Suggestion {
                key: key.to_string(),
                path: entry.path.to_string(),
                score,
                allowed: can_access(identity, entry.path),
            }
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}

/// Destinations worth offering as chips: the role's own area first, then shared pages.
pub fn featured(identity: &Identity, limit: usize) -> Vec<&'static RouteEntry> {
    let mut entries: Vec<&'static RouteEntry> = ROUTES
        .iter()
        .filter(|entry| can_access(identity, entry.path))
        .collect();
    entries.sort_by(|a, b| role_boost(b, identity).total_cmp(&role_boost(a, identity)));
    entries.truncate(limit);
    entries
}
