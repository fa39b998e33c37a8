use crate::db_types::{
    Booking, Business, Customer, Interaction, NewBooking, NewInteraction, BOOKING_STATUS_PENDING,
};
use crate::error::AppError;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

/// The data store as seen by a call session. Every method is one round trip.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn find_active_business(&self, routing_number: &str)
        -> Result<Option<Business>, AppError>;

    async fn find_customer(
        &self,
        business_id: Uuid,
        phone_number: &str,
    ) -> Result<Option<Customer>, AppError>;

    /// Find-or-create keyed on (business, phone). Never creates a duplicate row,
    /// even when two sessions race on a first-time caller.
    async fn upsert_customer(
        &self,
        business_id: Uuid,
        phone_number: &str,
        name: &str,
    ) -> Result<Customer, AppError>;

    /// Find-or-create as above, incrementing the call counter in the same step.
    async fn record_customer_call(
        &self,
        business_id: Uuid,
        phone_number: &str,
        default_name: &str,
    ) -> Result<Customer, AppError>;

    /// Newest first.
    async fn recent_interactions(
        &self,
        customer_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Interaction>, AppError>;

    /// Soonest first.
    async fn upcoming_bookings(
        &self,
        customer_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Booking>, AppError>;

    /// Pending bookings on `date` (`YYYY-MM-DD`), earliest time first.
    async fn pending_bookings_on(
        &self,
        business_id: Uuid,
        date: &str,
    ) -> Result<Vec<Booking>, AppError>;

    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking, AppError>;

    async fn find_pending_booking(
        &self,
        business_id: Uuid,
        customer_name: &str,
        booking_time: &str,
    ) -> Result<Option<Booking>, AppError>;

    async fn update_booking_time(&self, booking_id: Uuid, new_time: &str) -> Result<(), AppError>;

    async fn insert_interaction(&self, interaction: NewInteraction)
        -> Result<Interaction, AppError>;
}

pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DataStore for PgStore {
    async fn find_active_business(
        &self,
        routing_number: &str,
    ) -> Result<Option<Business>, AppError> {
        let business = sqlx::query_as::<_, Business>(
            "
            select id, business_name, owner_phone_number, twilio_phone_number, status
            from businesses
            where twilio_phone_number = $1
              and status = 'active'
            limit 1
            ",
        )
        .bind(routing_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(business)
    }

    async fn find_customer(
        &self,
        business_id: Uuid,
        phone_number: &str,
    ) -> Result<Option<Customer>, AppError> {
        let customer = sqlx::query_as::<_, Customer>(
            "
            select *
            from customers
            where business_id = $1
              and phone_number = $2
            ",
        )
        .bind(business_id)
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(customer)
    }

    async fn upsert_customer(
        &self,
        business_id: Uuid,
        phone_number: &str,
        name: &str,
    ) -> Result<Customer, AppError> {
        // The no-op update makes `returning` yield the existing row on conflict.
        let customer = sqlx::query_as::<_, Customer>(
            "
            insert into customers (
              business_id,
              phone_number,
              name,
              total_calls
            ) values (
              $1,
              $2,
              $3,
              0
            )
            on conflict (business_id, phone_number)
            do update set phone_number = excluded.phone_number
            returning *
            ",
        )
        .bind(business_id)
        .bind(phone_number)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(customer)
    }

    async fn record_customer_call(
        &self,
        business_id: Uuid,
        phone_number: &str,
        default_name: &str,
    ) -> Result<Customer, AppError> {
        let customer = sqlx::query_as::<_, Customer>(
            "
            insert into customers (
              business_id,
              phone_number,
              name,
              total_calls
            ) values (
              $1,
              $2,
              $3,
              1
            )
            on conflict (business_id, phone_number)
            do update set total_calls = customers.total_calls + 1
            returning *
            ",
        )
        .bind(business_id)
        .bind(phone_number)
        .bind(default_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(customer)
    }

    async fn recent_interactions(
        &self,
        customer_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Interaction>, AppError> {
        let interactions = sqlx::query_as::<_, Interaction>(
            "
            select *
            from interactions
            where customer_id = $1
            order by created_at desc
            limit $2
            ",
        )
        .bind(customer_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(interactions)
    }

    async fn upcoming_bookings(
        &self,
        customer_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Booking>, AppError> {
        let bookings = sqlx::query_as::<_, Booking>(
            "
            select *
            from bookings
            where customer_id = $1
              and status = $2
            order by booking_date asc, booking_time asc
            limit $3
            ",
        )
        .bind(customer_id)
        .bind(BOOKING_STATUS_PENDING)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }

    async fn pending_bookings_on(
        &self,
        business_id: Uuid,
        date: &str,
    ) -> Result<Vec<Booking>, AppError> {
        let bookings = sqlx::query_as::<_, Booking>(
            "
            select *
            from bookings
            where business_id = $1
              and booking_date = $2
              and status = $3
            order by booking_time asc
            ",
        )
        .bind(business_id)
        .bind(date)
        .bind(BOOKING_STATUS_PENDING)
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }

    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking, AppError> {
        let booking = sqlx::query_as::<_, Booking>(
            "
            insert into bookings (
              business_id,
              customer_id,
              customer_name,
              customer_phone,
              booking_date,
              booking_time,
              service_type,
              notes,
              status
            ) values (
              $1,
              $2,
              $3,
              $4,
              $5,
              $6,
              $7,
              $8,
              $9
            )
            returning *
            ",
        )
        .bind(booking.business_id)
        .bind(booking.customer_id)
        .bind(booking.customer_name)
        .bind(booking.customer_phone)
        .bind(booking.booking_date)
        .bind(booking.booking_time)
        .bind(booking.service_type)
        .bind(booking.notes)
        .bind(BOOKING_STATUS_PENDING)
        .fetch_one(&self.pool)
        .await?;
        Ok(booking)
    }

    async fn find_pending_booking(
        &self,
        business_id: Uuid,
        customer_name: &str,
        booking_time: &str,
    ) -> Result<Option<Booking>, AppError> {
        let booking = sqlx::query_as::<_, Booking>(
            "
            select *
            from bookings
            where business_id = $1
              and customer_name = $2
              and booking_time = $3
              and status = $4
            order by created_at asc
            limit 1
            ",
        )
        .bind(business_id)
        .bind(customer_name)
        .bind(booking_time)
        .bind(BOOKING_STATUS_PENDING)
        .fetch_optional(&self.pool)
        .await?;
        Ok(booking)
    }

    async fn update_booking_time(&self, booking_id: Uuid, new_time: &str) -> Result<(), AppError> {
        sqlx::query(
            "
            update bookings
            set booking_time = $2
            where id = $1
            ",
        )
        .bind(booking_id)
        .bind(new_time)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_interaction(
        &self,
        interaction: NewInteraction,
    ) -> Result<Interaction, AppError> {
        let interaction = sqlx::query_as::<_, Interaction>(
            "
            insert into interactions (
              call_sid,
              business_id,
              customer_id,
              interaction_type,
              caller_phone,
              call_duration,
              transcript,
              summary,
              is_emergency
            ) values (
              $1,
              $2,
              $3,
              $4,
              $5,
              $6,
              $7,
              $8,
              $9
            )
            returning *
            ",
        )
        .bind(interaction.call_sid)
        .bind(interaction.business_id)
        .bind(interaction.customer_id)
        .bind(interaction.interaction_type.as_str())
        .bind(interaction.caller_phone)
        .bind(interaction.call_duration)
        .bind(interaction.transcript)
        .bind(interaction.summary)
        .bind(interaction.is_emergency)
        .fetch_one(&self.pool)
        .await?;
        Ok(interaction)
    }
}
