use crate::conversation_state::CallSession;
use crate::db_types::{Booking, NewBooking};
use crate::directive::{CreateBooking, Directive, EditBooking};
use crate::error::AppError;
use crate::notify::Notifier;
use crate::store::DataStore;
use crate::utils::truncate_chars;

use std::sync::Arc;
use tracing::{debug, error, info, Instrument};

/// Matched case-insensitively as substrings of the whole call transcript.
pub const EMERGENCY_KEYWORDS: &[&str] = &[
    "emergency",
    "burst",
    "leak",
    "flooding",
    "sparks",
    "gas leak",
];

const DEFAULT_CUSTOMER_NAME: &str = "Unknown";
const DEFAULT_SERVICE_TYPE: &str = "General";
const EMERGENCY_EXCERPT_CHARS: usize = 100;

pub fn detect_emergency(transcript: &str) -> bool {
    let lowered = transcript.to_lowercase();
    EMERGENCY_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

#[derive(Debug)]
pub enum ActionOutcome {
    BookingCreated(Booking),
    BookingMoved(Booking),
    NoMatchingBooking,
    Ignored,
}

/// Applies directives to the data store and tells the owner about them.
#[derive(Clone)]
pub struct ActionProcessor {
    store: Arc<dyn DataStore>,
    notifier: Arc<dyn Notifier>,
}

impl ActionProcessor {
    pub fn new(store: Arc<dyn DataStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    pub async fn apply(
        &self,
        session: &CallSession,
        directive: Directive,
    ) -> Result<ActionOutcome, AppError> {
        match directive {
            Directive::CreateBooking(create) => self.create_booking(session, create).await,
            Directive::EditBooking(edit) => self.edit_booking(session, edit).await,
            Directive::Unrecognized => {
                debug!("ignoring unrecognized action");
                Ok(ActionOutcome::Ignored)
            }
        }
    }

    /// Not atomic: the customer row stays even if the booking insert fails.
    async fn create_booking(
        &self,
        session: &CallSession,
        create: CreateBooking,
    ) -> Result<ActionOutcome, AppError> {
        let business = session.business();
        let phone = create
            .customer_phone
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| session.caller_number.clone());
        let customer_name = if create.customer_name.trim().is_empty() {
            DEFAULT_CUSTOMER_NAME.to_string()
        } else {
            create.customer_name
        };
        let customer = self
            .store
            .upsert_customer(business.id, &phone, &customer_name)
            .await?;
        let booking = self
            .store
            .insert_booking(NewBooking {
                business_id: business.id,
                customer_id: customer.id,
                customer_name,
                customer_phone: phone,
                booking_date: create.booking_date,
                booking_time: create.booking_time,
                service_type: create
                    .service_type
                    .unwrap_or_else(|| DEFAULT_SERVICE_TYPE.to_string()),
                notes: create.notes.unwrap_or_default(),
            })
            .await?;
        info!(booking=%booking.id, date=%booking.booking_date, time=%booking.booking_time, "booking created");

        let body = format!(
            "📅 NEW BOOKING\n{}\n{} at {}\n{}",
            booking.customer_name, booking.booking_date, booking.booking_time, booking.service_type
        );
        self.notify(&business.owner_phone_number, body);

        Ok(ActionOutcome::BookingCreated(booking))
    }

    /// Keyed on (business, customer name, old time); an unmatched edit is a
    /// silent no-op.
    async fn edit_booking(
        &self,
        session: &CallSession,
        edit: EditBooking,
    ) -> Result<ActionOutcome, AppError> {
        let business = session.business();
        let booking = self
            .store
            .find_pending_booking(business.id, &edit.customer_name, &edit.old_time)
            .await?;
        let Some(mut booking) = booking else {
            debug!(customer=%edit.customer_name, old_time=%edit.old_time, "no pending booking to move");
            return Ok(ActionOutcome::NoMatchingBooking);
        };
        self.store
            .update_booking_time(booking.id, &edit.new_time)
            .await?;
        info!(
            customer=%edit.customer_name,
            old_time=%edit.old_time,
            new_time=%edit.new_time,
            "booking moved"
        );
        booking.booking_time = edit.new_time;
        Ok(ActionOutcome::BookingMoved(booking))
    }

    /// Urgent message to the owner with the start of the transcript.
    pub fn alert_emergency(&self, session: &CallSession, transcript: &str) {
        let body = format!(
            "🚨 EMERGENCY CALL\n{}\n{}",
            session.caller_number,
            truncate_chars(transcript, EMERGENCY_EXCERPT_CHARS)
        );
        self.notify(&session.business().owner_phone_number, body);
    }

    /// Fire and forget: the send runs on its own task and failures are only
    /// logged.
    fn notify(&self, to: &str, body: String) {
        let notifier = self.notifier.clone();
        let to = to.to_string();
        tokio::spawn(
            async move {
                if let Err(e) = notifier.send_message(&to, &body).await {
                    error!(error=%e, "failed to notify owner");
                }
            }
            .in_current_span(),
        );
    }
}
