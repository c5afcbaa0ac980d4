//! Daily reminder content and timing. Delivering the reminder through an
//! OS notification service is left to the host.

use anyhow::anyhow;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::partition::{ViewMode, compute_time_data};

pub const QUOTES: &[&str] = &[
    "Make today count. You only have so many.",
    "Every day is a gift. Use it wisely.",
    "Time is your most valuable currency.",
    "The days are long but the years are short.",
    "Don't count the days, make the days count.",
    "Your time is limited. Don't waste it living someone else's life.",
    "Yesterday is gone. Tomorrow is not promised. Today is yours.",
    "The best time to start was yesterday. The next best time is now.",
    "Life is what happens when you're busy making other plans.",
    "Time you enjoy wasting is not wasted time.",
    "Seize the day. Every moment matters.",
    "You are exactly where you need to be.",
    "Progress, not perfection.",
    "Today is the youngest you'll ever be.",
    "Be present. Be grateful. Be alive.",
    "Small steps lead to big changes.",
    "You have more time than you think. Use it.",
    "This moment is all you have. Make it beautiful.",
    "Breathe. You're doing better than you know.",
    "The dots behind you are proof you've made it this far.",
    "Each day is a new dot. Fill it with intention.",
    "Your future self will thank you for what you do today.",
    "Life isn't about waiting for the storm to pass...",
    "Every sunrise is an invitation to brighten someone's day.",
    "You are the author of your own story.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderSettings {
    pub enabled: bool,
    pub hour: u32,
    pub minute: u32,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            hour: 8,
            minute: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderMessage {
    pub title: String,
    pub body: String,
}

pub fn random_quote<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    QUOTES.choose(rng).copied().unwrap_or(QUOTES[0])
}

/// The reminder always counts down the current month, whatever view the
/// user has selected.
pub fn reminder_message<R: Rng + ?Sized>(
    birth_year: i32,
    today: NaiveDate,
    rng: &mut R,
) -> ReminderMessage {
    let data = compute_time_data(ViewMode::Month, birth_year, today);
    ReminderMessage {
        title: format!("{} {}", data.remaining_units, data.label),
        body: random_quote(rng).to_string(),
    }
}

/// Next local time at `hour:minute` strictly after `now_local`.
pub fn next_fire_time(
    settings: ReminderSettings,
    now_local: NaiveDateTime,
) -> anyhow::Result<NaiveDateTime> {
    let today = now_local
        .date()
        .and_hms_opt(settings.hour, settings.minute, 0)
        .ok_or_else(|| {
            anyhow!(
                "invalid reminder time {:02}:{:02}",
                settings.hour,
                settings.minute
            )
        })?;
    if today > now_local {
        Ok(today)
    } else {
        Ok(today + Duration::days(1))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, 0))
            .expect("valid datetime")
    }

    #[test]
    fn title_counts_down_the_month() {
        let mut rng = StdRng::seed_from_u64(7);
        let today = NaiveDate::from_ymd_opt(2024, 2, 10).expect("valid date");
        let msg = reminder_message(1990, today, &mut rng);
        assert_eq!(msg.title, "20 days left this month");
        assert!(QUOTES.contains(&msg.body.as_str()));
    }

    #[test]
    fn quotes_are_drawn_from_the_list() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            assert!(QUOTES.contains(&random_quote(&mut rng)));
        }
        assert_eq!(QUOTES.len(), 25);
    }

    #[test]
    fn fires_later_today_when_time_not_reached() {
        let settings = ReminderSettings {
            enabled: true,
            hour: 8,
            minute: 0,
        };
        assert_eq!(
            next_fire_time(settings, at(2026, 3, 1, 7, 59)).expect("fire"),
            at(2026, 3, 1, 8, 0)
        );
    }

    #[test]
    fn rolls_over_to_tomorrow() {
        let settings = ReminderSettings::default();
        assert_eq!(
            next_fire_time(settings, at(2026, 12, 31, 8, 0)).expect("fire"),
            at(2027, 1, 1, 8, 0)
        );
    }

    #[test]
    fn invalid_time_is_rejected() {
        let settings = ReminderSettings {
            enabled: true,
            hour: 25,
            minute: 0,
        };
        assert!(next_fire_time(settings, at(2026, 3, 1, 7, 0)).is_err());
    }
}
