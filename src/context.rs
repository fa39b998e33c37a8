use crate::db_types::{Booking, Business, Customer, Interaction};
use crate::error::AppError;
use crate::store::DataStore;

use tracing::{debug, info};

const RECENT_INTERACTIONS: i64 = 3;
const UPCOMING_BOOKINGS: i64 = 5;

/// What we know about a returning caller when the call starts.
#[derive(Clone, Debug)]
pub struct CustomerContext {
    pub customer: Customer,
    /// Newest first
    pub recent_interactions: Vec<Interaction>,
    /// Soonest first
    pub upcoming_bookings: Vec<Booking>,
}

#[derive(Clone, Debug)]
pub struct SessionContext {
    pub business: Business,
    /// Manager Mode when true, Receptionist Mode otherwise
    pub is_owner: bool,
    /// `None` for the owner and for first-time callers
    pub customer: Option<CustomerContext>,
}

/// Resolve which business owns the dialed number and who is calling.
/// Read-only; fails with `NoOwnerForNumber` when no active business routes
/// `callee_number`.
pub async fn load_context(
    store: &dyn DataStore,
    callee_number: &str,
    caller_number: &str,
) -> Result<SessionContext, AppError> {
    let business = store
        .find_active_business(callee_number)
        .await?
        .ok_or_else(|| AppError::NoOwnerForNumber(callee_number.to_string()))?;

    let is_owner = caller_number == business.owner_phone_number;
    if is_owner {
        info!(business=%business.business_name, "owner calling; manager mode");
        return Ok(SessionContext {
            business,
            is_owner,
            customer: None,
        });
    }

    let customer = match store.find_customer(business.id, caller_number).await? {
        Some(customer) => {
            let recent_interactions = store
                .recent_interactions(customer.id, RECENT_INTERACTIONS)
                .await?;
            let upcoming_bookings = store
                .upcoming_bookings(customer.id, UPCOMING_BOOKINGS)
                .await?;
            debug!(
                customer=%customer.id,
                interactions = recent_interactions.len(),
                bookings = upcoming_bookings.len(),
                "returning caller"
            );
            Some(CustomerContext {
                customer,
                recent_interactions,
                upcoming_bookings,
            })
        }
        None => {
            debug!("new caller");
            None
        }
    };

    Ok(SessionContext {
        business,
        is_owner,
        customer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db_types::{InteractionType, NewBooking, NewInteraction};
    use crate::testing::{MemoryStore, CALLER, OWNER_PHONE, ROUTING_NUMBER};

    #[tokio::test]
    async fn unknown_number_is_fatal() {
        let store = MemoryStore::with_business();
        match load_context(&store, "+440000000000", CALLER).await {
            Err(AppError::NoOwnerForNumber(n)) => assert_eq!(n, "+440000000000"),
            other => panic!("expected NoOwnerForNumber, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn inactive_business_is_not_resolved() {
        let store = MemoryStore::with_business();
        store.set_business_status("inactive");
        assert!(matches!(
            load_context(&store, ROUTING_NUMBER, CALLER).await,
            Err(AppError::NoOwnerForNumber(_))
        ));
    }

    #[tokio::test]
    async fn owner_number_selects_manager_mode() {
        let store = MemoryStore::with_business();
        let context = load_context(&store, ROUTING_NUMBER, OWNER_PHONE).await.unwrap();
        assert!(context.is_owner);
        assert!(context.customer.is_none());
    }

    #[tokio::test]
    async fn first_time_caller_has_no_customer() {
        let store = MemoryStore::with_business();
        let context = load_context(&store, ROUTING_NUMBER, CALLER).await.unwrap();
        assert!(!context.is_owner);
        assert!(context.customer.is_none());
    }

    #[tokio::test]
    async fn returning_caller_loads_bounded_history() {
        let store = MemoryStore::with_business();
        let business_id = store.business().id;
        let customer = store
            .upsert_customer(business_id, CALLER, "Jane")
            .await
            .unwrap();
        for i in 0..5 {
            store
                .insert_interaction(NewInteraction {
                    call_sid: format!("CA{i}"),
                    business_id,
                    customer_id: Some(customer.id),
                    interaction_type: InteractionType::InboundCall,
                    caller_phone: CALLER.to_string(),
                    call_duration: 30,
                    transcript: String::new(),
                    summary: format!("call {i}"),
                    is_emergency: false,
                })
                .await
                .unwrap();
        }
        for day in (10..17).rev() {
            store
                .insert_booking(NewBooking {
                    business_id,
                    customer_id: customer.id,
                    customer_name: "Jane".to_string(),
                    customer_phone: CALLER.to_string(),
                    booking_date: format!("2026-11-{day}"),
                    booking_time: "09:00".to_string(),
                    service_type: "Plumbing".to_string(),
                    notes: String::new(),
                })
                .await
                .unwrap();
        }

        let context = load_context(&store, ROUTING_NUMBER, CALLER).await.unwrap();
        let customer = context.customer.unwrap();
        assert_eq!(customer.recent_interactions.len(), 3);
        assert_eq!(customer.recent_interactions[0].summary, "call 4");
        assert_eq!(customer.upcoming_bookings.len(), 5);
        assert_eq!(customer.upcoming_bookings[0].booking_date, "2026-11-10");
    }
}
