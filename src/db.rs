use anyhow::Context;
use chrono::{Duration, NaiveDate};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{AttendanceTrend, CourseStatus, MemberRecord, MemberSnapshot};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn upsert_member(
    pool: &PgPool,
    nickname: &str,
    email: &str,
    rank: &str,
    esa_course: CourseStatus,
    cfo_course: CourseStatus,
    merit_promotion: bool,
    attendance_adjustment: i32,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO clan_ranks.members
        (id, nickname, email, rank, esa_course, cfo_course, merit_promotion, attendance_adjustment)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (email) DO UPDATE
        SET nickname = EXCLUDED.nickname,
            rank = EXCLUDED.rank,
            esa_course = EXCLUDED.esa_course,
            cfo_course = EXCLUDED.cfo_course,
            merit_promotion = EXCLUDED.merit_promotion,
            attendance_adjustment = EXCLUDED.attendance_adjustment
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(nickname)
    .bind(email)
    .bind(rank)
    .bind(Option::<bool>::from(esa_course))
    .bind(Option::<bool>::from(cfo_course))
    .bind(merit_promotion)
    .bind(attendance_adjustment)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

async fn insert_attendance(
    pool: &PgPool,
    member_id: Uuid,
    attended_on: NaiveDate,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO clan_ranks.attendances (id, member_id, attended_on, source_key)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(member_id)
    .bind(attended_on)
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let members = vec![
        (
            "Ghostwolf",
            "ghostwolf@clan.example",
            "Private",
            CourseStatus::NotDone,
            CourseStatus::Unset,
            false,
            18,
        ),
        (
            "Nightjar",
            "nightjar@clan.example",
            "Sergeant",
            CourseStatus::Done,
            CourseStatus::NotDone,
            false,
            41,
        ),
        (
            "Ironfox",
            "ironfox@clan.example",
            "Recruit",
            CourseStatus::Unset,
            CourseStatus::Unset,
            true,
            6,
        ),
        (
            "Saltmarsh",
            "saltmarsh@clan.example",
            "Corporal",
            CourseStatus::NotDone,
            CourseStatus::NotDone,
            false,
            30,
        ),
    ];

    let last_session = NaiveDate::from_ymd_opt(2026, 10, 10).context("invalid date")?;

    for (nickname, email, rank, esa, cfo, merit, sessions) in members {
        let member_id = upsert_member(pool, nickname, email, rank, esa, cfo, merit, 0).await?;

        for week in 0..sessions {
            let attended_on = last_session - Duration::weeks(week);
            let source_key = format!("seed-{}-{}", nickname.to_lowercase(), week);
            insert_attendance(pool, member_id, attended_on, &source_key).await?;
        }
        debug!(nickname, sessions, "seeded member");
    }

    Ok(())
}

fn member_from_row(row: &PgRow) -> MemberRecord {
    let esa: Option<bool> = row.get("esa_course");
    let cfo: Option<bool> = row.get("cfo_course");

    MemberRecord {
        id: row.get("id"),
        nickname: row.get("nickname"),
        email: row.get("email"),
        snapshot: MemberSnapshot {
            rank: row.get("rank"),
            total_attendances: row.get("total_attendances"),
            esa_course: esa.into(),
            cfo_course: cfo.into(),
            merit_promotion: row.get("merit_promotion"),
        },
    }
}

/// Loads fresh member snapshots; totals are logged attendances plus the manual adjustment.
pub async fn fetch_members(pool: &PgPool, email: Option<&str>) -> anyhow::Result<Vec<MemberRecord>> {
    let mut query = String::from(
        r#"
        SELECT m.id, m.nickname, m.email, m.rank, m.esa_course, m.cfo_course,
               m.merit_promotion,
               (m.attendance_adjustment + COUNT(a.id))::BIGINT AS total_attendances
        FROM clan_ranks.members m
        LEFT JOIN clan_ranks.attendances a ON a.member_id = m.id
        "#,
    );

    if email.is_some() {
        query.push_str(" WHERE m.email = $1");
    }
    query.push_str(" GROUP BY m.id ORDER BY m.nickname");

    let mut rows = sqlx::query(&query);
    if let Some(value) = email {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    Ok(records.iter().map(member_from_row).collect())
}

pub async fn fetch_weekly_attendance(
    pool: &PgPool,
    since_date: NaiveDate,
    email: Option<&str>,
) -> anyhow::Result<Vec<AttendanceTrend>> {
    let mut query = String::from(
        r#"
        SELECT date_trunc('week', a.attended_on)::DATE AS week_start,
               COUNT(*) AS attendance_count,
               COUNT(DISTINCT a.member_id) AS member_count
        FROM clan_ranks.attendances a
        JOIN clan_ranks.members m ON m.id = a.member_id
        WHERE a.attended_on >= $1
        "#,
    );

    if email.is_some() {
        query.push_str(" AND m.email = $2");
    }
    query.push_str(" GROUP BY 1 ORDER BY 1");

    let mut rows = sqlx::query(&query).bind(since_date);
    if let Some(value) = email {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut trends = Vec::new();

    for row in records {
        trends.push(AttendanceTrend {
            week_start: row.get("week_start"),
            attendance_count: row.get("attendance_count"),
            member_count: row.get("member_count"),
        });
    }

    Ok(trends)
}

pub async fn import_members(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        nickname: String,
        email: String,
        rank: String,
        esa_course: Option<bool>,
        cfo_course: Option<bool>,
        merit_promotion: Option<bool>,
        attendance_adjustment: Option<i32>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut upserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        upsert_member(
            pool,
            row.nickname.trim(),
            row.email.trim(),
            row.rank.trim(),
            row.esa_course.into(),
            row.cfo_course.into(),
            row.merit_promotion.unwrap_or(false),
            row.attendance_adjustment.unwrap_or(0),
        )
        .await?;
        upserted += 1;
    }

    Ok(upserted)
}

/// Rows without a key fall back to one derived from member and date, so re-imports dedupe.
fn attendance_source_key(email: &str, attended_on: NaiveDate, source_key: Option<&str>) -> String {
    match source_key.map(str::trim).filter(|key| !key.is_empty()) {
        Some(key) => key.to_string(),
        None => format!("import-{}-{}", email.trim().to_lowercase(), attended_on),
    }
}

pub async fn import_attendance(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        email: String,
        attended_on: NaiveDate,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let member_id: Option<Uuid> =
            sqlx::query("SELECT id FROM clan_ranks.members WHERE email = $1")
                .bind(row.email.trim())
                .fetch_optional(pool)
                .await?
                .map(|found| found.get("id"));

        let Some(member_id) = member_id else {
            warn!(email = %row.email, "skipping attendance for unknown member");
            continue;
        };

        let source_key = attendance_source_key(&row.email, row.attended_on, row.source_key.as_deref());

        if insert_attendance(pool, member_id, row.attended_on, &source_key).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}
