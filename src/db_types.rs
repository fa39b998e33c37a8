use sqlx::types::time::OffsetDateTime;
use uuid::Uuid;

pub const BOOKING_STATUS_PENDING: &str = "pending";

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Business {
    pub id: Uuid,
    pub business_name: String,
    /// The proprietor's own phone; calls from it run in Manager Mode.
    pub owner_phone_number: String,
    /// The number callers dial; Twilio routes it to this service.
    pub twilio_phone_number: String,
    pub status: String,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Customer {
    pub id: Uuid,
    pub business_id: Uuid,
    pub phone_number: String,
    pub name: String,
    pub total_calls: i32,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub business_id: Uuid,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub customer_phone: String,
    /// `YYYY-MM-DD`
    pub booking_date: String,
    /// `HH:MM`
    pub booking_time: String,
    pub service_type: String,
    pub status: String,
    pub notes: String,
    pub created_at: OffsetDateTime,
}

pub struct NewBooking {
    pub business_id: Uuid,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub customer_phone: String,
    pub booking_date: String,
    pub booking_time: String,
    pub service_type: String,
    pub notes: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InteractionType {
    Booking,
    InboundCall,
    OwnerTest,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::Booking => "booking",
            InteractionType::InboundCall => "inbound_call",
            InteractionType::OwnerTest => "owner_test",
        }
    }
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Interaction {
    pub id: Uuid,
    pub call_sid: String,
    pub business_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub interaction_type: String,
    pub caller_phone: String,
    pub call_duration: i32,
    pub transcript: String,
    pub summary: String,
    pub is_emergency: bool,
    pub created_at: OffsetDateTime,
}

/// Call log written once at finalization.
#[derive(Clone, Debug)]
pub struct NewInteraction {
    pub call_sid: String,
    pub business_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub interaction_type: InteractionType,
    pub caller_phone: String,
    pub call_duration: i32,
    pub transcript: String,
    pub summary: String,
    pub is_emergency: bool,
}
