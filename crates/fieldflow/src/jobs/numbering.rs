use sqlx::PgConnection;

pub const PREFIX: &str = "JOB";

/// `JOB-2025-0042`. Sequences past 9999 keep growing in width.
pub fn format_job_number(year: i32, seq: i32) -> String {
    format!("{PREFIX}-{year:04}-{seq:04}")
}

/// Parse the year and sequence back out of a job number.
pub fn parse_job_number(s: &str) -> Option<(i32, i32)> {
    let mut parts = s.splitn(3, '-');
    if parts.next()? != PREFIX {
        return None;
    }
    let year = parts.next()?;
    let seq = parts.next()?;
    if year.len() != 4 || seq.len() < 4 {
        return None;
    }
    Some((year.parse().ok()?, seq.parse().ok()?))
}

/// Reserve the next number for `year`.
///
/// Runs inside the caller's transaction: the counter row stays locked until commit, so
/// concurrent intakes serialize and a rolled-back intake gives its number back.
/// The first use of a year seeds the counter from numbers already issued with its prefix.
pub async fn next_job_number(conn: &mut PgConnection, year: i32) -> anyhow::Result<String> {
    let seq: i32 = sqlx::query_scalar(
        r#"
        INSERT INTO job_number_counters (year, last_seq)
        VALUES (
          $1,
          (SELECT COUNT(*)::int FROM jobs WHERE job_number LIKE $2) + 1
        )
        ON CONFLICT (year)
        DO UPDATE SET last_seq = job_number_counters.last_seq + 1
        RETURNING last_seq
        "#,
    )
    .bind(year)
    .bind(format!("{PREFIX}-{year:04}-%"))
    .fetch_one(&mut *conn)
    .await?;

    Ok(format_job_number(year, seq))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_are_zero_padded() {
        assert_eq!(format_job_number(2025, 1), "JOB-2025-0001");
        assert_eq!(format_job_number(2024, 42), "JOB-2024-0042");
        assert_eq!(format_job_number(2025, 12345), "JOB-2025-12345");
    }

    #[test]
    fn parse_inverts_format() {
        assert_eq!(parse_job_number("JOB-2025-0007"), Some((2025, 7)));
        assert_eq!(parse_job_number("JOB-25-0007"), None);
        assert_eq!(parse_job_number("INV-2025-0007"), None);
        assert_eq!(parse_job_number("JOB-2025-7"), None);
    }
}
