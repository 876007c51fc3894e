use std::fmt::Write;

use chrono::NaiveDate;

use crate::config::PolicyConfig;
use crate::models::{AttendanceTrend, MemberProgress, MemberRecord, NextRank};
use crate::progression;

pub fn describe_progress(entry: &MemberProgress) -> String {
    let progress = &entry.progress;
    match (
        &progress.next_rank,
        progress.progress_percentage,
        progress.attendances_needed,
    ) {
        (NextRank::MeritPromotion, _, _) => "flagged for merit promotion".to_string(),
        (NextRank::MaximumRank, _, _) => "at maximum rank".to_string(),
        (next, Some(pct), Some(needed)) => {
            format!("{:.0}% toward {} ({} to go)", pct, next, needed)
        }
        (next, _, _) => format!("{} is not reachable by attendance", next),
    }
}

pub fn build_report(
    scope: Option<&str>,
    since: NaiveDate,
    members: &[MemberRecord],
    trends: &[AttendanceTrend],
    policy: &PolicyConfig,
) -> String {
    let summaries = progression::summarize_by_rank(members, &policy.ranks);
    let roster = progression::evaluate_roster(members.to_vec(), policy);

    let mut output = String::new();
    let scope_label = scope.unwrap_or("the whole clan");

    let _ = writeln!(output, "# Clan Rank Progression Report");
    let _ = writeln!(
        output,
        "Generated for {} (attendance trend since {})",
        scope_label, since
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Rank Distribution");

    if summaries.is_empty() {
        let _ = writeln!(output, "No members on record.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} members (avg {:.1} attendances)",
                summary.rank, summary.member_count, summary.avg_attendances
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Promotion Candidates");

    let candidates: Vec<&MemberProgress> =
        roster.iter().filter(|entry| entry.promotion_suggested).collect();
    if candidates.is_empty() {
        let _ = writeln!(output, "No members have reached their next threshold.");
    } else {
        for entry in candidates {
            let _ = writeln!(
                output,
                "- {} ({}): {} with {} attendances, eligible for {}",
                entry.member.nickname,
                entry.member.email,
                entry.progress.current_rank,
                entry.member.snapshot.total_attendances.max(0),
                next_rank_by_attendance(entry, policy)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Merit Promotions");

    let merit: Vec<&MemberProgress> = roster
        .iter()
        .filter(|entry| entry.progress.next_rank == NextRank::MeritPromotion)
        .collect();
    if merit.is_empty() {
        let _ = writeln!(output, "No members flagged for merit promotion.");
    } else {
        for entry in merit {
            let _ = writeln!(
                output,
                "- {} ({})",
                entry.member.nickname, entry.progress.current_rank
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Course Alerts");

    let alerts: Vec<&MemberProgress> = roster
        .iter()
        .filter(|entry| entry.course_alert.is_some())
        .collect();
    if alerts.is_empty() {
        let _ = writeln!(output, "No outstanding course alerts.");
    } else {
        for entry in alerts {
            if let Some(alert) = &entry.course_alert {
                let _ = writeln!(output, "- {}: {}", entry.member.nickname, alert.message);
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Roster Progress");

    if roster.is_empty() {
        let _ = writeln!(output, "No members on record.");
    } else {
        for entry in roster.iter() {
            let _ = writeln!(
                output,
                "- {} ({}): {}",
                entry.member.nickname,
                entry.progress.current_rank,
                describe_progress(entry)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Weekly Attendance");

    if trends.is_empty() {
        let _ = writeln!(output, "No attendance recorded for this window.");
    } else {
        for trend in trends.iter() {
            let _ = writeln!(
                output,
                "- week of {}: {} attendances from {} members",
                trend.week_start, trend.attendance_count, trend.member_count
            );
        }
    }

    output
}

// Merit-flagged candidates still list the rank their attendance earns.
fn next_rank_by_attendance(entry: &MemberProgress, policy: &PolicyConfig) -> NextRank {
    let snapshot = &entry.member.snapshot;
    progression::compute_next_rank(&snapshot.rank, snapshot.total_attendances, false, &policy.ranks)
        .next_rank
}
