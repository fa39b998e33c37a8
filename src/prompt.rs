//! Per-turn system prompt. Rebuilt every turn so the clock and today's
//! schedule stay current over a long call.

use crate::actions::EMERGENCY_KEYWORDS;
use crate::context::{CustomerContext, SessionContext};
use crate::db_types::Booking;
use crate::store::DataStore;
use crate::utils::truncate_chars;

use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing::warn;

pub const NO_APPOINTMENTS: &str = "No appointments today";
pub const SCHEDULE_UNAVAILABLE: &str = "Schedule unavailable right now";
const LAST_SUMMARY_CHARS: usize = 150;

const LONG_DATE: &[FormatItem<'static>] =
    format_description!("[weekday], [day] [month repr:long] [year]");
const DAY_AND_MONTH: &[FormatItem<'static>] =
    format_description!("[weekday], [day] [month repr:long]");
const ISO_DATE: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const CLOCK_TIME: &[FormatItem<'static>] = format_description!("[hour]:[minute]");

pub fn iso_date(date: Date) -> String {
    date.format(ISO_DATE).unwrap_or_default()
}

/// `Name at HH:MM` pairs joined by commas, or the fixed fallback.
pub fn format_schedule(today: &[Booking]) -> String {
    if today.is_empty() {
        return NO_APPOINTMENTS.to_string();
    }
    today
        .iter()
        .map(|b| format!("{} at {}", b.customer_name, b.booking_time))
        .collect::<Vec<String>>()
        .join(", ")
}

/// Fetch today's schedule and render the prompt. A store failure degrades to a
/// prompt without the schedule.
pub async fn compose_prompt(
    store: &dyn DataStore,
    assistant_name: &str,
    context: &SessionContext,
    now: OffsetDateTime,
) -> String {
    let today = iso_date(now.date());
    let schedule = match store.pending_bookings_on(context.business.id, &today).await {
        Ok(bookings) => format_schedule(&bookings),
        Err(e) => {
            warn!(error=%e, "failed to load today's schedule");
            SCHEDULE_UNAVAILABLE.to_string()
        }
    };
    render_prompt(assistant_name, context, &schedule, now)
}

pub fn render_prompt(
    assistant_name: &str,
    context: &SessionContext,
    schedule: &str,
    now: OffsetDateTime,
) -> String {
    let current_date = now.format(LONG_DATE).unwrap_or_default();
    let current_time = now.format(CLOCK_TIME).unwrap_or_default();
    let business_name = &context.business.business_name;

    if context.is_owner {
        return format!(
            r#"You are {assistant_name}, the loyal British assistant to the owner of {business_name}.

CURRENT DATE/TIME: {current_date} at {current_time}

MANAGER MODE - the owner is calling.

TODAY'S SCHEDULE: {schedule}

YOUR JOB:
1. Greet the owner warmly, like a trusted right-hand who knows them well
2. Read out today's schedule when asked
3. Move appointments to a new time when asked
4. Answer questions about bookings and customers
5. Keep it brief, dry and good-humoured

EDITING APPOINTMENTS:
Once the owner has said which appointment to move and the new time, confirm it in one short sentence, then append exactly one JSON object:
{{"action": "edit_booking", "customer_name": "John Smith", "old_time": "14:00", "new_time": "15:30"}}
Use the customer name and 24-hour time exactly as they appear in the schedule.

TONE: Warm, witty and professional. Phrases like 'Right then', 'Lovely stuff' and 'Sorted' suit you.
"#
        );
    }

    let today_iso = iso_date(now.date());
    let tomorrow = now.date().next_day().unwrap_or(now.date());
    let tomorrow_long = tomorrow.format(DAY_AND_MONTH).unwrap_or_default();
    let tomorrow_iso = iso_date(tomorrow);
    let caller = caller_block(context.customer.as_ref());
    let keywords = EMERGENCY_KEYWORDS
        .iter()
        .map(|k| format!("\"{k}\""))
        .collect::<Vec<String>>()
        .join(", ");

    format!(
        r#"You are {assistant_name}, the professional British receptionist for {business_name}.

CURRENT DATE/TIME: {current_date} at {current_time}

RECEPTIONIST MODE

{caller}
TODAY'S SCHEDULE (for reference): {schedule}

YOUR JOB:
1. Answer questions about services, pricing and availability
2. Help callers book appointments
3. Check requested times against today's schedule
4. Take messages for the owner
5. Handle emergencies calmly

BOOKING PROCESS:
- Ask for: full name, phone number, preferred date and time, type of service
- Today is {today_iso}. If they say "tomorrow", that means {tomorrow_long} ({tomorrow_iso})
- Avoid times that are already taken
- When you have every detail, confirm it in one short sentence, then append exactly one JSON object:
{{"action": "create_booking", "customer_name": "...", "customer_phone": "...", "booking_date": "YYYY-MM-DD", "booking_time": "HH:MM", "service_type": "..."}}

EMERGENCIES: If you hear {keywords}, treat the call as an EMERGENCY. Stay calm, take their address and number, and tell them the owner is being alerted now.

TONE: Professional and warm. Keep responses under 3 sentences unless giving detailed information; everything you say is spoken aloud on a phone call.
"#
    )
}

fn caller_block(customer: Option<&CustomerContext>) -> String {
    let Some(ctx) = customer else {
        return "NEW CALLER - first time calling\n".to_string();
    };
    let mut block = format!(
        "RETURNING CALLER: {}\nTotal previous calls: {}\n",
        ctx.customer.name, ctx.customer.total_calls
    );
    if let Some(last) = ctx.recent_interactions.first() {
        let summary = truncate_chars(&last.summary, LAST_SUMMARY_CHARS);
        block.push_str(&format!("\nLAST CONVERSATION: {summary}\n"));
    }
    if !ctx.upcoming_bookings.is_empty() {
        block.push_str("\nUPCOMING BOOKINGS:\n");
        for b in &ctx.upcoming_bookings {
            block.push_str(&format!(
                "- {} at {}: {}\n",
                b.booking_date, b.booking_time, b.service_type
            ));
        }
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{booking, business, customer, interaction, MemoryStore};
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2026-10-19 10:05 UTC);

    fn context(is_owner: bool, customer: Option<CustomerContext>) -> SessionContext {
        SessionContext {
            business: business(),
            is_owner,
            customer,
        }
    }

    #[test]
    fn schedule_lists_name_at_time_pairs() {
        let today = vec![
            booking("Alice", "2026-10-19", "09:00"),
            booking("Bob", "2026-10-19", "14:30"),
        ];
        assert_eq!(format_schedule(&today), "Alice at 09:00, Bob at 14:30");
        assert_eq!(format_schedule(&[]), NO_APPOINTMENTS);
    }

    #[test]
    fn manager_mode_prompt() {
        let prompt = render_prompt("Julian", &context(true, None), "Alice at 09:00", NOW);
        assert!(prompt.contains("MANAGER MODE"));
        assert!(prompt.contains("TODAY'S SCHEDULE: Alice at 09:00"));
        assert!(prompt.contains("Monday, 19 October 2026 at 10:05"));
        assert!(prompt.contains(r#"{"action": "edit_booking", "customer_name": "#));
        assert!(!prompt.contains("create_booking"));
    }

    #[test]
    fn receptionist_prompt_for_new_caller() {
        let prompt = render_prompt("Julian", &context(false, None), NO_APPOINTMENTS, NOW);
        assert!(prompt.contains("RECEPTIONIST MODE"));
        assert!(prompt.contains("NEW CALLER"));
        assert!(prompt.contains("Tuesday, 20 October (2026-10-20)"));
        assert!(prompt.contains(r#""booking_date": "YYYY-MM-DD", "booking_time": "HH:MM""#));
        assert!(prompt.contains("\"gas leak\""));
        assert!(!prompt.contains("edit_booking"));
    }

    #[test]
    fn receptionist_prompt_for_returning_caller() {
        let long_summary = "x".repeat(400);
        let ctx = CustomerContext {
            customer: customer("Jane", 4),
            recent_interactions: vec![interaction(&long_summary), interaction("older call")],
            upcoming_bookings: vec![booking("Jane", "2026-10-21", "15:00")],
        };
        let prompt = render_prompt("Julian", &context(false, Some(ctx)), NO_APPOINTMENTS, NOW);
        assert!(prompt.contains("RETURNING CALLER: Jane"));
        assert!(prompt.contains("Total previous calls: 4"));
        assert!(prompt.contains(&format!("LAST CONVERSATION: {}\n", "x".repeat(150))));
        assert!(!prompt.contains(&"x".repeat(151)));
        assert!(!prompt.contains("older call"));
        assert!(prompt.contains("- 2026-10-21 at 15:00: Plumbing"));
    }

    #[tokio::test]
    async fn compose_is_stable_for_a_fixed_clock() {
        let store = MemoryStore::with_business();
        store.seed_booking("Alice", "2026-10-19", "09:00");
        store.seed_booking("Bob", "2026-10-19", "14:30");
        store.seed_booking("Carol", "2026-10-20", "11:00");
        let ctx = context(true, None);
        let first = compose_prompt(&store, "Julian", &ctx, NOW).await;
        let second = compose_prompt(&store, "Julian", &ctx, NOW).await;
        assert_eq!(first, second);
        assert!(first.contains("TODAY'S SCHEDULE: Alice at 09:00, Bob at 14:30\n"));
    }

    #[tokio::test]
    async fn compose_survives_store_failure() {
        let store = MemoryStore::with_business();
        store.fail_reads(true);
        let prompt = compose_prompt(&store, "Julian", &context(true, None), NOW).await;
        assert!(prompt.contains(SCHEDULE_UNAVAILABLE));
    }
}
