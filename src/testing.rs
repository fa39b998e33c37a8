//! In-memory store and scripted service doubles for driving sessions without
//! a database or network.

use crate::completion::Completion;
use crate::consts;
use crate::context::load_context;
use crate::conversation_state::CallSession;
use crate::db_types::{
    Booking, Business, Customer, Interaction, NewBooking, NewInteraction, BOOKING_STATUS_PENDING,
};
use crate::error::{AppError, ServiceError};
use crate::notify::Notifier;
use crate::store::DataStore;
use crate::stt::SpeechToText;
use crate::tts::TextToSpeech;
use crate::types::{
    AudioFormat, ChatMessage, SessionDeps, SessionSettings, VoiceGender, VoiceParams,
};

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::macros::datetime;
use time::OffsetDateTime;
use uuid::Uuid;

pub const ROUTING_NUMBER: &str = "+441130000000";
pub const OWNER_PHONE: &str = "+447700900001";
pub const CALLER: &str = "+447700900123";
pub const BUSINESS_ID: Uuid = Uuid::from_u128(0x0b5e_0001);
/// Monday
pub const NOW: OffsetDateTime = datetime!(2026-10-19 10:05 UTC);

pub fn business() -> Business {
    Business {
        id: BUSINESS_ID,
        business_name: "Hartley Plumbing".to_string(),
        owner_phone_number: OWNER_PHONE.to_string(),
        twilio_phone_number: ROUTING_NUMBER.to_string(),
        status: "active".to_string(),
    }
}

pub fn booking(customer_name: &str, date: &str, time: &str) -> Booking {
    Booking {
        id: Uuid::new_v4(),
        business_id: BUSINESS_ID,
        customer_id: Uuid::new_v4(),
        customer_name: customer_name.to_string(),
        customer_phone: CALLER.to_string(),
        booking_date: date.to_string(),
        booking_time: time.to_string(),
        service_type: "Plumbing".to_string(),
        status: BOOKING_STATUS_PENDING.to_string(),
        notes: String::new(),
        created_at: NOW,
    }
}

pub fn customer(name: &str, total_calls: i32) -> Customer {
    Customer {
        id: Uuid::new_v4(),
        business_id: BUSINESS_ID,
        phone_number: CALLER.to_string(),
        name: name.to_string(),
        total_calls,
        created_at: NOW,
    }
}

pub fn interaction(summary: &str) -> Interaction {
    Interaction {
        id: Uuid::new_v4(),
        call_sid: "CA0".to_string(),
        business_id: BUSINESS_ID,
        customer_id: None,
        interaction_type: "inbound_call".to_string(),
        caller_phone: CALLER.to_string(),
        call_duration: 42,
        transcript: String::new(),
        summary: summary.to_string(),
        is_emergency: false,
        created_at: NOW,
    }
}

fn store_failure() -> AppError {
    AppError::Persistence(sqlx::Error::PoolTimedOut)
}

#[derive(Default)]
struct Tables {
    businesses: Vec<Business>,
    customers: Vec<Customer>,
    bookings: Vec<Booking>,
    /// Insertion order; newest last
    interactions: Vec<Interaction>,
    booking_updates: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_reads: AtomicBool,
    fail_booking_inserts: AtomicBool,
    fail_interaction_inserts: AtomicBool,
}

impl MemoryStore {
    pub fn with_business() -> Self {
        let store = Self::default();
        store.tables.lock().unwrap().businesses.push(business());
        store
    }

    pub fn business(&self) -> Business {
        self.tables.lock().unwrap().businesses[0].clone()
    }

    pub fn set_business_status(&self, status: &str) {
        self.tables.lock().unwrap().businesses[0].status = status.to_string();
    }

    pub fn seed_booking(&self, customer_name: &str, date: &str, time: &str) {
        self.tables
            .lock()
            .unwrap()
            .bookings
            .push(booking(customer_name, date, time));
    }

    /// Schedule and history reads fail while set.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_booking_inserts(&self, fail: bool) {
        self.fail_booking_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_interaction_inserts(&self, fail: bool) {
        self.fail_interaction_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn customers(&self) -> Vec<Customer> {
        self.tables.lock().unwrap().customers.clone()
    }

    pub fn bookings(&self) -> Vec<Booking> {
        self.tables.lock().unwrap().bookings.clone()
    }

    pub fn interactions(&self) -> Vec<Interaction> {
        self.tables.lock().unwrap().interactions.clone()
    }

    pub fn booking_updates(&self) -> usize {
        self.tables.lock().unwrap().booking_updates
    }

    fn check_reads(&self) -> Result<(), AppError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(store_failure());
        }
        Ok(())
    }

    fn find_or_insert_customer(
        tables: &mut Tables,
        business_id: Uuid,
        phone_number: &str,
        name: &str,
    ) -> usize {
        if let Some(idx) = tables
            .customers
            .iter()
            .position(|c| c.business_id == business_id && c.phone_number == phone_number)
        {
            return idx;
        }
        tables.customers.push(Customer {
            id: Uuid::new_v4(),
            business_id,
            phone_number: phone_number.to_string(),
            name: name.to_string(),
            total_calls: 0,
            created_at: NOW,
        });
        tables.customers.len() - 1
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn find_active_business(
        &self,
        routing_number: &str,
    ) -> Result<Option<Business>, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .businesses
            .iter()
            .find(|b| b.twilio_phone_number == routing_number && b.status == "active")
            .cloned())
    }

    async fn find_customer(
        &self,
        business_id: Uuid,
        phone_number: &str,
    ) -> Result<Option<Customer>, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .customers
            .iter()
            .find(|c| c.business_id == business_id && c.phone_number == phone_number)
            .cloned())
    }

    async fn upsert_customer(
        &self,
        business_id: Uuid,
        phone_number: &str,
        name: &str,
    ) -> Result<Customer, AppError> {
        let mut tables = self.tables.lock().unwrap();
        let idx = Self::find_or_insert_customer(&mut tables, business_id, phone_number, name);
        Ok(tables.customers[idx].clone())
    }

    async fn record_customer_call(
        &self,
        business_id: Uuid,
        phone_number: &str,
        default_name: &str,
    ) -> Result<Customer, AppError> {
        let mut tables = self.tables.lock().unwrap();
        let idx =
            Self::find_or_insert_customer(&mut tables, business_id, phone_number, default_name);
        tables.customers[idx].total_calls += 1;
        Ok(tables.customers[idx].clone())
    }

    async fn recent_interactions(
        &self,
        customer_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Interaction>, AppError> {
        self.check_reads()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .interactions
            .iter()
            .rev()
            .filter(|i| i.customer_id == Some(customer_id))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn upcoming_bookings(
        &self,
        customer_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Booking>, AppError> {
        self.check_reads()?;
        let tables = self.tables.lock().unwrap();
        let mut bookings: Vec<Booking> = tables
            .bookings
            .iter()
            .filter(|b| b.customer_id == customer_id && b.status == BOOKING_STATUS_PENDING)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| {
            (&a.booking_date, &a.booking_time).cmp(&(&b.booking_date, &b.booking_time))
        });
        bookings.truncate(limit as usize);
        Ok(bookings)
    }

    async fn pending_bookings_on(
        &self,
        business_id: Uuid,
        date: &str,
    ) -> Result<Vec<Booking>, AppError> {
        self.check_reads()?;
        let tables = self.tables.lock().unwrap();
        let mut bookings: Vec<Booking> = tables
            .bookings
            .iter()
            .filter(|b| {
                b.business_id == business_id
                    && b.booking_date == date
                    && b.status == BOOKING_STATUS_PENDING
            })
            .cloned()
            .collect();
        bookings.sort_by(|a, b| a.booking_time.cmp(&b.booking_time));
        Ok(bookings)
    }

    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking, AppError> {
        if self.fail_booking_inserts.load(Ordering::SeqCst) {
            return Err(store_failure());
        }
        let row = Booking {
            id: Uuid::new_v4(),
            business_id: booking.business_id,
            customer_id: booking.customer_id,
            customer_name: booking.customer_name,
            customer_phone: booking.customer_phone,
            booking_date: booking.booking_date,
            booking_time: booking.booking_time,
            service_type: booking.service_type,
            status: BOOKING_STATUS_PENDING.to_string(),
            notes: booking.notes,
            created_at: NOW,
        };
        self.tables.lock().unwrap().bookings.push(row.clone());
        Ok(row)
    }

    async fn find_pending_booking(
        &self,
        business_id: Uuid,
        customer_name: &str,
        booking_time: &str,
    ) -> Result<Option<Booking>, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .bookings
            .iter()
            .find(|b| {
                b.business_id == business_id
                    && b.customer_name == customer_name
                    && b.booking_time == booking_time
                    && b.status == BOOKING_STATUS_PENDING
            })
            .cloned())
    }

    async fn update_booking_time(&self, booking_id: Uuid, new_time: &str) -> Result<(), AppError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(b) = tables.bookings.iter_mut().find(|b| b.id == booking_id) {
            b.booking_time = new_time.to_string();
        }
        tables.booking_updates += 1;
        Ok(())
    }

    async fn insert_interaction(
        &self,
        interaction: NewInteraction,
    ) -> Result<Interaction, AppError> {
        if self.fail_interaction_inserts.load(Ordering::SeqCst) {
            return Err(store_failure());
        }
        let row = Interaction {
            id: Uuid::new_v4(),
            call_sid: interaction.call_sid,
            business_id: interaction.business_id,
            customer_id: interaction.customer_id,
            interaction_type: interaction.interaction_type.as_str().to_string(),
            caller_phone: interaction.caller_phone,
            call_duration: interaction.call_duration,
            transcript: interaction.transcript,
            summary: interaction.summary,
            is_emergency: interaction.is_emergency,
            created_at: NOW,
        };
        self.tables.lock().unwrap().interactions.push(row.clone());
        Ok(row)
    }
}

/// Build a session the way the websocket handler does, against `store`.
pub async fn session_for(store: &MemoryStore, caller: &str) -> CallSession {
    let context = load_context(store, ROUTING_NUMBER, caller).await.unwrap();
    CallSession::new(
        "CA1".to_string(),
        "MZ1".to_string(),
        caller.to_string(),
        ROUTING_NUMBER.to_string(),
        context,
        consts::HISTORY_WINDOW,
    )
}

fn unavailable(service: &'static str) -> ServiceError {
    ServiceError::Status {
        service,
        status: http::StatusCode::SERVICE_UNAVAILABLE,
        body: "scripted failure".to_string(),
    }
}

/// Returns queued transcripts in order, then nothing.
#[derive(Default)]
pub struct ScriptedStt {
    transcripts: Mutex<VecDeque<Option<String>>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedStt {
    pub fn new(transcripts: &[Option<&str>]) -> Self {
        Self {
            transcripts: Mutex::new(
                transcripts
                    .iter()
                    .map(|t| t.map(str::to_string))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Each recognition takes `delay` before answering.
    pub fn slow(transcripts: &[Option<&str>], delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(transcripts)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechToText for ScriptedStt {
    async fn transcribe(
        &self,
        _audio: &[u8],
        _format: &AudioFormat,
    ) -> Result<Option<String>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.transcripts.lock().unwrap().pop_front().flatten())
    }
}

/// Replies from a queue; a `None` entry (or an empty queue) fails the call.
/// Every request is recorded.
#[derive(Default)]
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Option<String>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedCompletion {
    pub fn new(replies: &[Option<&str>]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.map(str::to_string)).collect()),
            requests: Mutex::new(vec![]),
        }
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Completion for ScriptedCompletion {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .flatten()
            .ok_or_else(|| unavailable("completion"))
    }
}

/// Echoes the text bytes back as "audio".
#[derive(Default)]
pub struct FakeTts {
    fail: AtomicBool,
    spoken: Mutex<Vec<String>>,
}

impl FakeTts {
    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            spoken: Mutex::new(vec![]),
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextToSpeech for FakeTts {
    async fn synthesize(
        &self,
        text: &str,
        _voice: &VoiceParams,
        _format: &AudioFormat,
    ) -> Result<Vec<u8>, ServiceError> {
        self.spoken.lock().unwrap().push(text.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(unavailable("tts"));
        }
        Ok(text.as_bytes().to_vec())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    fail: bool,
    delay: Duration,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Every send takes `delay` before it lands.
    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// `(to, body)` pairs of delivered messages.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Messages go out on detached tasks; give them up to five seconds to
    /// reach `count`.
    pub async fn wait_for_sent(&self, count: usize) -> Vec<(String, String)> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let sent = self.sent();
            if sent.len() >= count || tokio::time::Instant::now() >= deadline {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_message(&self, to: &str, body: &str) -> Result<(), ServiceError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(unavailable("sms"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok(())
    }
}

pub fn settings() -> SessionSettings {
    SessionSettings {
        assistant_name: "Julian".to_string(),
        greeting: consts::GREETING.to_string(),
        audio: AudioFormat::telephony("en-GB"),
        voice: VoiceParams {
            language_code: "en-GB".to_string(),
            name: "en-GB-Neural2-B".to_string(),
            gender: VoiceGender::Male,
        },
        service_timeout: Duration::from_millis(500),
        history_window: consts::HISTORY_WINDOW,
    }
}

pub fn deps(
    store: Arc<MemoryStore>,
    stt: Arc<ScriptedStt>,
    completion: Arc<ScriptedCompletion>,
    tts: Arc<FakeTts>,
    notifier: Arc<RecordingNotifier>,
) -> SessionDeps {
    SessionDeps {
        store,
        stt,
        completion,
        tts,
        notifier,
        clock: Arc::new(|| NOW),
        settings: settings(),
        pending_calls: Arc::new(Mutex::new(HashMap::new())),
    }
}
