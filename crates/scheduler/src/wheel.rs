use chrono::{DateTime, Duration, Utc};
use core_types::Timeframe;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub(crate) struct BotSchedule {
    pub credential_id: Uuid,
    pub timeframe: Timeframe,
    pub next_due: DateTime<Utc>,
}

/// Rounds `now` up to the next timeframe boundary (M15 bots fire at
/// :00/:15/:30/:45) so bots sharing a timeframe tick together rather than
/// drifting apart based on when each one happened to register.
pub(crate) fn next_boundary(now: DateTime<Utc>, timeframe: Timeframe) -> DateTime<Utc> {
    let tf_minutes = timeframe.to_minutes();
    let epoch_minutes = now.timestamp().div_euclid(60);
    let boundary_minute = (epoch_minutes / tf_minutes + 1) * tf_minutes;
    DateTime::from_timestamp(boundary_minute * 60, 0).unwrap_or_else(|| now + Duration::minutes(tf_minutes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_up_to_the_next_boundary() {
        let now = "2026-07-30T10:07:30Z".parse::<DateTime<Utc>>().unwrap();
        let due = next_boundary(now, Timeframe::M15);
        assert_eq!(due, "2026-07-30T10:15:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[test]
    fn lands_exactly_on_boundary_still_advances() {
        let now = "2026-07-30T10:15:00Z".parse::<DateTime<Utc>>().unwrap();
        let due = next_boundary(now, Timeframe::M15);
        assert_eq!(due, "2026-07-30T10:30:00Z".parse::<DateTime<Utc>>().unwrap());
    }
}
