use std::collections::HashMap;

use tracing::warn;

use crate::config::{PolicyConfig, RankTable};
use crate::courses::compute_course_alert;
use crate::error::ProgressionError;
use crate::models::{MemberProgress, MemberRecord, MemberSnapshot, NextRank, RankProgress, RankSummary};

/// Maps a raw attendance count into `0..=u32::MAX`, logging negative input.
pub fn clamp_attendances(total_attendances: i64) -> u32 {
    if total_attendances < 0 {
        warn!(
            error = %ProgressionError::InvalidAttendanceCount(total_attendances),
            "attendance count out of range"
        );
        return 0;
    }
    u32::try_from(total_attendances).unwrap_or(u32::MAX)
}

fn rank_index(current_rank: &str, table: &RankTable) -> usize {
    table.position(current_rank).unwrap_or_else(|| {
        warn!(
            error = %ProgressionError::UnknownRank(current_rank.to_string()),
            fallback = %table.lowest().name,
            "rank not in rank table"
        );
        0
    })
}

fn progress_percentage(attendances: u32, window_start: u32, window_end: u32) -> f64 {
    if window_end <= window_start {
        return if attendances >= window_end { 100.0 } else { 0.0 };
    }
    let earned = f64::from(attendances) - f64::from(window_start);
    let span = f64::from(window_end - window_start);
    (earned / span * 100.0).clamp(0.0, 100.0)
}

/// Works out where a member stands relative to the next rank.
///
/// `merit_promotion` is decided by an admin elsewhere; when set, the result
/// carries no percentage so callers can render it apart from a progress bar.
/// The maximum rank ignores the flag.
pub fn compute_next_rank(
    current_rank: &str,
    total_attendances: i64,
    merit_promotion: bool,
    table: &RankTable,
) -> RankProgress {
    let attendances = clamp_attendances(total_attendances);
    let index = rank_index(current_rank, table);
    let current = &table.tiers()[index];

    if table.is_maximum_index(index) {
        return RankProgress {
            current_rank: current.name.clone(),
            next_rank: NextRank::MaximumRank,
            progress_percentage: Some(100.0),
            attendances_needed: None,
            next_rank_threshold: None,
        };
    }

    if merit_promotion {
        return RankProgress {
            current_rank: current.name.clone(),
            next_rank: NextRank::MeritPromotion,
            progress_percentage: None,
            attendances_needed: None,
            next_rank_threshold: None,
        };
    }

    let next = &table.tiers()[index + 1];
    // Every tier before the last carries a threshold.
    let window_start = current.threshold.unwrap_or_default();

    match next.threshold {
        Some(window_end) => RankProgress {
            current_rank: current.name.clone(),
            next_rank: NextRank::Rank(next.name.clone()),
            progress_percentage: Some(progress_percentage(attendances, window_start, window_end)),
            attendances_needed: Some(window_end.saturating_sub(attendances)),
            next_rank_threshold: Some(window_end),
        },
        None => RankProgress {
            current_rank: current.name.clone(),
            next_rank: NextRank::Rank(next.name.clone()),
            progress_percentage: Some(0.0),
            attendances_needed: None,
            next_rank_threshold: None,
        },
    }
}

/// Admin filter: the member has enough attendances for the next rank.
pub fn is_promotion_suggested(member: &MemberSnapshot, table: &RankTable) -> bool {
    let progress = compute_next_rank(&member.rank, member.total_attendances, false, table);
    !progress.is_maximum() && progress.attendances_needed == Some(0)
}

pub fn evaluate_member(member: MemberRecord, policy: &PolicyConfig) -> MemberProgress {
    let snapshot = &member.snapshot;
    let progress = compute_next_rank(
        &snapshot.rank,
        snapshot.total_attendances,
        snapshot.merit_promotion,
        &policy.ranks,
    );
    let course_alert = compute_course_alert(snapshot, &policy.courses);
    let promotion_suggested = is_promotion_suggested(snapshot, &policy.ranks);

    MemberProgress {
        member,
        progress,
        course_alert,
        promotion_suggested,
    }
}

/// Evaluates every member, promotion candidates first, then by progress.
pub fn evaluate_roster(members: Vec<MemberRecord>, policy: &PolicyConfig) -> Vec<MemberProgress> {
    let mut roster: Vec<MemberProgress> = members
        .into_iter()
        .map(|member| evaluate_member(member, policy))
        .collect();

    roster.sort_by(|a, b| {
        b.promotion_suggested
            .cmp(&a.promotion_suggested)
            .then_with(|| {
                let a_pct = a.progress.progress_percentage.unwrap_or(100.0);
                let b_pct = b.progress.progress_percentage.unwrap_or(100.0);
                b_pct.total_cmp(&a_pct)
            })
            .then_with(|| a.member.nickname.cmp(&b.member.nickname))
    });
    roster
}

/// Member counts per rank, in rank-table order. Unrecognised ranks follow, by name.
pub fn summarize_by_rank(members: &[MemberRecord], table: &RankTable) -> Vec<RankSummary> {
    let mut map: HashMap<String, (usize, i64)> = HashMap::new();

    for member in members {
        let name = match table.position(&member.snapshot.rank) {
            Some(index) => table.tiers()[index].name.clone(),
            None => member.snapshot.rank.trim().to_string(),
        };
        let entry = map.entry(name).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += member.snapshot.total_attendances.max(0);
    }

    let mut summaries: Vec<RankSummary> = map
        .into_iter()
        .map(|(rank, (count, total))| RankSummary {
            rank,
            member_count: count,
            avg_attendances: if count == 0 {
                0.0
            } else {
                total as f64 / count as f64
            },
        })
        .collect();

    summaries.sort_by(|a, b| {
        let a_pos = table.position(&a.rank).unwrap_or(usize::MAX);
        let b_pos = table.position(&b.rank).unwrap_or(usize::MAX);
        a_pos.cmp(&b_pos).then_with(|| a.rank.cmp(&b.rank))
    });
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RankTier;
    use crate::models::CourseStatus;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn example_table() -> RankTable {
        RankTable::new(vec![
            RankTier::new("Recruit", Some(0)),
            RankTier::new("Private", Some(10)),
            RankTier::new("Sergeant", Some(30)),
            RankTier::new("Maximum", None),
        ])
        .expect("valid table")
    }

    fn capped_table() -> RankTable {
        RankTable::new(vec![
            RankTier::new("Recruit", Some(0)),
            RankTier::new("Private", Some(10)),
            RankTier::new("Sergeant", Some(30)),
            RankTier::new("Maximum", Some(60)),
        ])
        .expect("valid table")
    }

    fn snapshot(rank: &str, attendances: i64) -> MemberSnapshot {
        MemberSnapshot {
            rank: rank.to_string(),
            total_attendances: attendances,
            esa_course: CourseStatus::Unset,
            cfo_course: CourseStatus::Unset,
            merit_promotion: false,
        }
    }

    fn record(nickname: &str, rank: &str, attendances: i64) -> MemberRecord {
        MemberRecord {
            id: Uuid::new_v4(),
            nickname: nickname.to_string(),
            email: format!("{}@example.com", nickname.to_lowercase()),
            snapshot: snapshot(rank, attendances),
        }
    }

    #[test]
    fn private_with_25_attendances_is_three_quarters_to_sergeant() {
        let progress = compute_next_rank("Private", 25, false, &example_table());
        assert_eq!(progress.next_rank, NextRank::Rank("Sergeant".to_string()));
        assert_eq!(progress.progress_percentage, Some(75.0));
        assert_eq!(progress.attendances_needed, Some(5));
        assert_eq!(progress.next_rank_threshold, Some(30));
    }

    #[test]
    fn maximum_rank_is_terminal() {
        for (attendances, merit) in [(0, false), (5, true), (1_000, false), (1_000, true)] {
            let progress = compute_next_rank("Maximum", attendances, merit, &capped_table());
            assert_eq!(progress.next_rank, NextRank::MaximumRank);
            assert_eq!(progress.next_rank.to_string(), "Maximum Rank");
            assert_eq!(progress.progress_percentage, Some(100.0));
            assert_eq!(progress.attendances_needed, None);
            assert_eq!(progress.next_rank_threshold, None);
        }
    }

    #[test]
    fn unknown_rank_uses_lowest_window() {
        let progress = compute_next_rank("Admiral", 5, false, &example_table());
        assert_eq!(progress.current_rank, "Recruit");
        assert_eq!(progress.next_rank, NextRank::Rank("Private".to_string()));
        assert_eq!(progress.progress_percentage, Some(50.0));
        assert_eq!(progress.attendances_needed, Some(5));
    }

    #[test]
    fn negative_attendances_are_clamped() {
        let progress = compute_next_rank("Recruit", -7, false, &example_table());
        assert_eq!(progress.progress_percentage, Some(0.0));
        assert_eq!(progress.attendances_needed, Some(10));
    }

    #[test]
    fn merit_promotion_has_no_progress_bar() {
        let progress = compute_next_rank("Private", 12, true, &example_table());
        assert_eq!(progress.next_rank, NextRank::MeritPromotion);
        assert_eq!(progress.next_rank.to_string(), "Merit Promotion");
        assert_eq!(progress.progress_percentage, None);
        assert_eq!(progress.attendances_needed, None);
    }

    #[test]
    fn merit_flag_at_maximum_rank_stays_terminal() {
        let progress = compute_next_rank("Commander", 500, true, &RankTable::default());
        assert_eq!(progress.current_rank, "Commander");
        assert_eq!(progress.next_rank, NextRank::MaximumRank);
        assert_eq!(progress.progress_percentage, Some(100.0));
    }

    #[test]
    fn unreachable_maximum_reports_no_threshold() {
        let progress = compute_next_rank("Sergeant", 400, false, &example_table());
        assert_eq!(progress.next_rank, NextRank::Rank("Maximum".to_string()));
        assert_eq!(progress.progress_percentage, Some(0.0));
        assert_eq!(progress.attendances_needed, None);
        assert!(!is_promotion_suggested(&snapshot("Sergeant", 400), &example_table()));
    }

    #[test]
    fn attendance_below_current_window_reads_as_zero() {
        let progress = compute_next_rank("Sergeant", 12, false, &capped_table());
        assert_eq!(progress.progress_percentage, Some(0.0));
        assert_eq!(progress.attendances_needed, Some(48));
    }

    #[test]
    fn equal_thresholds_do_not_divide_by_zero() {
        assert_eq!(progress_percentage(9, 10, 10), 0.0);
        assert_eq!(progress_percentage(10, 10, 10), 100.0);
    }

    #[test]
    fn promotion_suggested_once_threshold_met() {
        let table = example_table();
        assert!(!is_promotion_suggested(&snapshot("Private", 29), &table));
        assert!(is_promotion_suggested(&snapshot("Private", 30), &table));
        assert!(is_promotion_suggested(&snapshot("Recruit", 45), &table));
        assert!(!is_promotion_suggested(&snapshot("Maximum", 999), &capped_table()));
    }

    #[test]
    fn merit_flag_does_not_change_suggestion() {
        let mut member = snapshot("Private", 30);
        member.merit_promotion = true;
        assert!(is_promotion_suggested(&member, &example_table()));
    }

    #[test]
    fn roster_lists_candidates_first() {
        let policy = PolicyConfig {
            ranks: example_table(),
            ..PolicyConfig::default()
        };
        let roster = evaluate_roster(
            vec![
                record("Bravo", "Private", 20),
                record("Alpha", "Private", 31),
                record("Charlie", "Recruit", 9),
                record("Delta", "Private", 20),
            ],
            &policy,
        );

        let order: Vec<&str> = roster.iter().map(|p| p.member.nickname.as_str()).collect();
        assert_eq!(order, vec!["Alpha", "Charlie", "Bravo", "Delta"]);
        assert!(roster[0].promotion_suggested);
    }

    #[test]
    fn summary_follows_table_order() {
        let table = example_table();
        let members = vec![
            record("A", "Sergeant", 40),
            record("B", "recruit", 2),
            record("C", "Sergeant", 50),
            record("D", "Ghost", 3),
        ];

        let summaries = summarize_by_rank(&members, &table);
        let ranks: Vec<&str> = summaries.iter().map(|s| s.rank.as_str()).collect();
        assert_eq!(ranks, vec!["Recruit", "Sergeant", "Ghost"]);
        assert_eq!(summaries[1].member_count, 2);
        assert!((summaries[1].avg_attendances - 45.0).abs() < 0.001);
    }

    proptest! {
        #[test]
        fn progress_stays_within_bounds(rank_index in 0usize..4, attendances in -50i64..500) {
            let table = capped_table();
            let rank = table.tiers()[rank_index].name.clone();
            let progress = compute_next_rank(&rank, attendances, false, &table);
            let pct = progress.progress_percentage.expect("percentage");
            prop_assert!((0.0..=100.0).contains(&pct));
        }

        #[test]
        fn attendances_needed_never_increases(rank_index in 0usize..3, attendances in 0i64..200) {
            let table = capped_table();
            let rank = table.tiers()[rank_index].name.clone();
            let now = compute_next_rank(&rank, attendances, false, &table);
            let later = compute_next_rank(&rank, attendances + 1, false, &table);
            let now_needed = now.attendances_needed.expect("needed");
            let later_needed = later.attendances_needed.expect("needed");
            prop_assert!(later_needed <= now_needed);

            let threshold = now.next_rank_threshold.expect("threshold");
            prop_assert_eq!(now_needed == 0, attendances >= i64::from(threshold));
        }

        #[test]
        fn suggestion_matches_zero_needed(rank_index in 0usize..4, attendances in 0i64..200) {
            let table = capped_table();
            let rank = table.tiers()[rank_index].name.clone();
            let progress = compute_next_rank(&rank, attendances, false, &table);
            let expected = progress.attendances_needed == Some(0) && !progress.is_maximum();
            prop_assert_eq!(is_promotion_suggested(&snapshot(&rank, attendances), &table), expected);
        }
    }
}
