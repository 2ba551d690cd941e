//! Fixed-width console rendering of member listings.

use crate::model::member::Member;
use crate::repo::member_store::MemberSummary;
use std::fmt::Write;

const RULE_WIDTH: usize = 85;

/// Renders members as a fixed-width table followed by a status summary line.
pub fn render_member_table(members: &[Member], summary: &MemberSummary) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "========== MEMBER LIST ==========");
    let _ = writeln!(
        out,
        "{:<5} {:<20} {:<15} {:<10} {:<12} {:<12} {:<10}",
        "ID", "Name", "Phone", "Plan", "Start", "End", "Status"
    );
    let _ = writeln!(out, "{rule}");

    for member in members {
        let _ = writeln!(
            out,
            "{:<5} {:<20} {:<15} {:<10} {:<12} {:<12} {:<10}",
            member.id,
            member.name,
            member.phone,
            member.plan_type,
            member.start_date.to_string(),
            member.end_date.to_string(),
            member.status
        );
    }

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "Total: {} | Active: {} | Expired: {}",
        summary.total, summary.active, summary.expired
    );
    let _ = write!(out, "================================");
    out
}
