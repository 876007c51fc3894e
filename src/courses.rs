use crate::config::CoursePolicy;
use crate::models::{CourseAlert, CourseStatus, MemberSnapshot};
use crate::progression::clamp_attendances;

/// Returns the single alert to show for `member`, if any.
///
/// A course alerts when it is explicitly not done and the member has logged at
/// least `alert_threshold` attendances. When both courses qualify the one
/// listed first in the policy precedence is returned.
pub fn compute_course_alert(member: &MemberSnapshot, policy: &CoursePolicy) -> Option<CourseAlert> {
    let attendances = clamp_attendances(member.total_attendances);
    if attendances < policy.alert_threshold() {
        return None;
    }

    policy
        .precedence()
        .iter()
        .find(|course| member.course_status(**course) == CourseStatus::NotDone)
        .map(|course| CourseAlert {
            course: *course,
            message: format!(
                "Complete the {} course: {} attendances logged without it",
                course, attendances
            ),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Course;

    fn member(attendances: i64, esa: CourseStatus, cfo: CourseStatus) -> MemberSnapshot {
        MemberSnapshot {
            rank: "Private".to_string(),
            total_attendances: attendances,
            esa_course: esa,
            cfo_course: cfo,
            merit_promotion: false,
        }
    }

    #[test]
    fn alerts_once_threshold_is_reached() {
        let policy = CoursePolicy::default();
        let below = member(9, CourseStatus::NotDone, CourseStatus::Done);
        let at = member(10, CourseStatus::NotDone, CourseStatus::Done);

        assert_eq!(compute_course_alert(&below, &policy), None);
        let alert = compute_course_alert(&at, &policy).expect("alert");
        assert_eq!(alert.course, Course::Esa);
        assert_eq!(
            alert.message,
            "Complete the ESA course: 10 attendances logged without it"
        );
    }

    #[test]
    fn done_and_unset_never_alert() {
        let policy = CoursePolicy::default();
        let done = member(50, CourseStatus::Done, CourseStatus::Done);
        let unset = member(50, CourseStatus::Unset, CourseStatus::Unset);
        let mixed = member(50, CourseStatus::Done, CourseStatus::Unset);

        assert_eq!(compute_course_alert(&done, &policy), None);
        assert_eq!(compute_course_alert(&unset, &policy), None);
        assert_eq!(compute_course_alert(&mixed, &policy), None);
    }

    #[test]
    fn precedence_picks_the_first_listed_course() {
        let both = member(25, CourseStatus::NotDone, CourseStatus::NotDone);

        let esa_first = CoursePolicy::default();
        let cfo_first = CoursePolicy::new(10, vec![Course::Cfo, Course::Esa]).expect("policy");

        for _ in 0..3 {
            assert_eq!(
                compute_course_alert(&both, &esa_first).map(|a| a.course),
                Some(Course::Esa)
            );
            assert_eq!(
                compute_course_alert(&both, &cfo_first).map(|a| a.course),
                Some(Course::Cfo)
            );
        }
    }

    #[test]
    fn lower_priority_course_alerts_when_the_other_is_done() {
        let policy = CoursePolicy::default();
        let cfo_only = member(12, CourseStatus::Done, CourseStatus::NotDone);
        assert_eq!(
            compute_course_alert(&cfo_only, &policy).map(|a| a.course),
            Some(Course::Cfo)
        );
    }

    #[test]
    fn negative_attendance_counts_as_zero() {
        let policy = CoursePolicy::new(0, Course::ALL.to_vec()).expect("policy");
        let alert = compute_course_alert(&member(-4, CourseStatus::NotDone, CourseStatus::Unset), &policy)
            .expect("alert");
        assert_eq!(
            alert.message,
            "Complete the ESA course: 0 attendances logged without it"
        );
    }
}
