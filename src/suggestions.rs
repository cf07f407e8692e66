use chrono::{Datelike, NaiveDate, Timelike, Utc};

use crate::models::{
    ActionType, Contact, ContactIntelligence, FreshnessLevel, QuickAction, SwipeActions,
    TrendDirection, Urgency,
};

/// Birthday window (in days) that produces a high-urgency greeting suggestion.
const BIRTHDAY_WINDOW_DAYS: i64 = 14;

/// Computes the prioritized list of contact-interaction suggestions.
///
/// Priority, highest first:
/// 1. birthday within 14 days
/// 2. critical data freshness (urgent reconnect)
/// 3. improving relationship trend (use the momentum)
/// 4. channel actions gated by available contact data
/// 5. universal actions (schedule, note)
///
/// The returned list is sorted by the canonical comparator (urgency tier,
/// primary flag, preferred-channel match, enabled) with stable tie-breaks,
/// so equal-ranked suggestions keep the insertion order above.
pub fn suggested_actions(contact: &Contact, intelligence: &ContactIntelligence) -> Vec<QuickAction> {
    suggested_actions_on(contact, intelligence, Utc::now().date_naive())
}

/// Deterministic variant of [`suggested_actions`] with an injected "today".
pub fn suggested_actions_on(
    contact: &Contact,
    intelligence: &ContactIntelligence,
    today: NaiveDate,
) -> Vec<QuickAction> {
    let mut actions = Vec::new();
    let has_phone = contact.any_phone().is_some();

    if birthday_within(contact.birthday, today, BIRTHDAY_WINDOW_DAYS) {
        actions.push(QuickAction {
            id: "birthday-greeting".to_string(),
            action_type: ActionType::Call,
            label: "Zum Geburtstag gratulieren".to_string(),
            urgency: Urgency::High,
            primary: true,
            enabled: has_phone,
        });
    }

    if intelligence.freshness_level == Some(FreshnessLevel::Critical) {
        actions.push(QuickAction {
            id: "urgent-reconnect".to_string(),
            action_type: ActionType::Call,
            label: "Dringend Kontakt aufnehmen".to_string(),
            urgency: Urgency::High,
            primary: true,
            enabled: has_phone,
        });
    }

    if intelligence.trend_direction == Some(TrendDirection::Improving) {
        actions.push(QuickAction {
            id: "momentum-follow-up".to_string(),
            action_type: ActionType::Email,
            label: "Momentum nutzen".to_string(),
            urgency: Urgency::Medium,
            primary: false,
            enabled: contact.email.is_some(),
        });
    }

    // Channel actions only appear when the data to execute them exists.
    if has_phone {
        actions.push(channel_action("call", ActionType::Call, "Anrufen"));
    }
    if contact.mobile.is_some() {
        actions.push(channel_action("whatsapp", ActionType::Whatsapp, "WhatsApp senden"));
        actions.push(channel_action("sms", ActionType::Sms, "SMS senden"));
    }
    if contact.email.is_some() {
        actions.push(channel_action("email", ActionType::Email, "E-Mail schreiben"));
    }

    // Universal actions, always available.
    actions.push(QuickAction {
        id: "schedule".to_string(),
        action_type: ActionType::Calendar,
        label: "Termin vereinbaren".to_string(),
        urgency: Urgency::None,
        primary: false,
        enabled: true,
    });
    actions.push(QuickAction {
        id: "note".to_string(),
        action_type: ActionType::Note,
        label: "Notiz hinzufügen".to_string(),
        urgency: Urgency::None,
        primary: false,
        enabled: true,
    });

    sort_suggestions(&mut actions, intelligence.preferred_channel);
    actions
}

fn channel_action(id: &str, action_type: ActionType, label: &str) -> QuickAction {
    QuickAction {
        id: id.to_string(),
        action_type,
        label: label.to_string(),
        urgency: Urgency::Low,
        primary: false,
        enabled: true,
    }
}

/// Canonical suggestion ordering. `Vec::sort_by` is stable, so ties preserve
/// insertion order.
pub fn sort_suggestions(actions: &mut [QuickAction], preferred_channel: Option<ActionType>) {
    actions.sort_by(|a, b| {
        let key = |action: &QuickAction| {
            (
                action.urgency,
                !action.primary,
                Some(action.action_type) != preferred_channel,
                !action.enabled,
            )
        };
        key(a).cmp(&key(b))
    });
}

/// Resolves the swipe-left / swipe-right gesture bindings.
///
/// Right is the primary outward action; left is the written follow-up.
/// Either side is `None` when the contact offers no way to execute it.
pub fn swipe_actions(contact: &Contact, intelligence: &ContactIntelligence) -> SwipeActions {
    swipe_actions_on(contact, intelligence, Utc::now().date_naive())
}

/// Deterministic variant of [`swipe_actions`] with an injected "today".
pub fn swipe_actions_on(
    contact: &Contact,
    intelligence: &ContactIntelligence,
    today: NaiveDate,
) -> SwipeActions {
    let suggestions = suggested_actions_on(contact, intelligence, today);

    let right = suggestions
        .iter()
        .find(|a| a.action_type == ActionType::Call && a.urgency == Urgency::High)
        .or_else(|| {
            if intelligence.preferred_channel == Some(ActionType::Whatsapp) {
                suggestions
                    .iter()
                    .find(|a| a.action_type == ActionType::Whatsapp)
            } else {
                None
            }
        })
        .or_else(|| {
            suggestions
                .iter()
                .find(|a| a.action_type == ActionType::Call)
        })
        .cloned()
        .or_else(|| {
            contact.any_phone().map(|_| QuickAction {
                id: "default-call".to_string(),
                action_type: ActionType::Call,
                label: "Anrufen".to_string(),
                urgency: Urgency::None,
                primary: true,
                enabled: true,
            })
        });

    let left = suggestions
        .iter()
        .find(|a| a.action_type == ActionType::Email)
        .or_else(|| {
            suggestions
                .iter()
                .find(|a| a.action_type == ActionType::Whatsapp)
        })
        .cloned()
        .or_else(|| {
            contact.email.as_ref().map(|_| QuickAction {
                id: "default-email".to_string(),
                action_type: ActionType::Email,
                label: "E-Mail schreiben".to_string(),
                urgency: Urgency::None,
                primary: false,
                enabled: true,
            })
        });

    SwipeActions { left, right }
}

/// Days until the next occurrence of `birthday`, handling year wrap-around.
/// Returns `None` when no birthday is known.
pub fn days_until_birthday(birthday: Option<NaiveDate>, today: NaiveDate) -> Option<i64> {
    let birthday = birthday?;
    let this_year = occurrence_in_year(birthday, today.year())?;
    let next = if this_year < today {
        occurrence_in_year(birthday, today.year() + 1)?
    } else {
        this_year
    };
    Some((next - today).num_days())
}

// Feb 29 birthdays fall back to Mar 1 in non-leap years.
fn occurrence_in_year(birthday: NaiveDate, year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, birthday.month(), birthday.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, 3, 1))
}

fn birthday_within(birthday: Option<NaiveDate>, today: NaiveDate, window: i64) -> bool {
    matches!(days_until_birthday(birthday, today), Some(days) if days <= window)
}

/// Time-of-day greeting used by the message templates.
pub fn time_based_greeting() -> &'static str {
    greeting_for_hour(chrono::Local::now().hour())
}

pub fn greeting_for_hour(hour: u32) -> &'static str {
    match hour {
        0..=11 => "Guten Morgen",
        12..=17 => "Guten Tag",
        _ => "Guten Abend",
    }
}
