//! Firestore REST document store
//!
//! Talks to the Firestore v1 REST surface (or the local emulator) with
//! explicit per-record codecs. Money is written as `doubleValue` and read
//! back rounded to cents; instants are `timestampValue`.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::{
    CONTACT_FORMS, ContactStore, INBOUND_EMAILS, INVOICES, Insert, InvoiceStore, SUBSCRIPTIONS,
    SubscriptionStore,
};
use crate::error::{CoreError, Result};
use crate::model::{
    Activation, ContactRecord, InboundEmailRecord, Invoice, Subscription,
    SubscriptionStatus,
};

const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";

/// Attempts at the read-then-conditional-patch activation loop
const ACTIVATE_ATTEMPTS: usize = 3;

type Fields = Map<String, Value>;

/// Escaped in document ids so an id never spans more than one path segment
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Connection settings for the document database
#[derive(Clone, Debug)]
pub struct FirestoreConfig {
    pub project_id: String,
    /// `https://firestore.googleapis.com/v1` or `http://localhost:8080/v1` for the emulator
    pub base_url: String,
    /// OAuth bearer token; not needed against the emulator
    pub token: Option<String>,
    pub timeout: Duration,
}

impl FirestoreConfig {
    /// Read `FIRESTORE_PROJECT_ID`, `FIRESTORE_BASE_URL` and `FIRESTORE_TOKEN`.
    ///
    /// Returns `None` when no project is configured.
    pub fn from_env(timeout: Duration) -> Option<Self> {
        let project_id = env::var("FIRESTORE_PROJECT_ID").ok().filter(|p| !p.is_empty())?;
        Some(Self {
            project_id,
            base_url: env::var("FIRESTORE_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            token: env::var("FIRESTORE_TOKEN").ok().filter(|t| !t.is_empty()),
            timeout,
        })
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents",
            self.base_url, self.project_id
        )
    }
}

/// Document store backed by Firestore
pub struct FirestoreStore {
    client: Client,
    config: FirestoreConfig,
}

/// Raw document as returned by the REST API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Fields,
    update_time: Option<String>,
}

impl RawDocument {
    fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    document: Option<RawDocument>,
}

/// Google API error envelope
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: ApiError,
}

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

impl FirestoreStore {
    pub fn new(config: FirestoreConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!(
            "{}/{collection}/{}",
            self.config.documents_url(),
            utf8_percent_encode(id, PATH_SEGMENT)
        )
    }

    /// Create a document; `Ok(false)` when the id is taken
    async fn create_document(&self, collection: &str, id: &str, fields: Fields) -> Result<bool> {
        let url = format!("{}/{collection}", self.config.documents_url());
        let response = self
            .request(Method::POST, &url)
            .query(&[("documentId", id)])
            .json(&json!({ "fields": fields }))
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            debug!(collection, id, "Document already exists");
            return Ok(false);
        }
        check(response).await?;
        Ok(true)
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<RawDocument>> {
        let response = self
            .request(Method::GET, &self.document_url(collection, id))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(check(response).await?.json().await?))
    }

    /// Overwrite `mask` fields, optionally only if the document is unchanged since `update_time`
    async fn patch_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        update_time: Option<&str>,
    ) -> Result<()> {
        let mut query: Vec<(&str, String)> = fields
            .keys()
            .map(|key| ("updateMask.fieldPaths", key.clone()))
            .collect();
        match update_time {
            Some(ts) => query.push(("currentDocument.updateTime", ts.to_string())),
            None => query.push(("currentDocument.exists", "true".to_string())),
        }

        let response = self
            .request(Method::PATCH, &self.document_url(collection, id))
            .query(&query)
            .json(&json!({ "fields": fields }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// All documents of `collection` whose string `field` equals `value`
    async fn query_equal(&self, collection: &str, field: &str, value: &str) -> Result<Vec<RawDocument>> {
        let url = format!("{}:runQuery", self.config.documents_url());
        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": collection }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": field },
                        "op": "EQUAL",
                        "value": string(value),
                    }
                }
            }
        });

        let response = self.request(Method::POST, &url).json(&body).send().await?;
        let rows: Vec<QueryRow> = check(response).await?.json().await?;
        Ok(rows.into_iter().filter_map(|row| row.document).collect())
    }
}

/// Map non-success responses onto store errors
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body: ApiErrorBody = response.json().await.unwrap_or_default();
    let detail = format!("{status}: {} {}", body.error.status, body.error.message);
    match (status, body.error.status.as_str()) {
        (_, "FAILED_PRECONDITION" | "ABORTED") | (StatusCode::CONFLICT, _) => {
            Err(CoreError::Conflict(detail))
        }
        (StatusCode::NOT_FOUND, _) => Err(CoreError::NotFound(detail)),
        _ => Err(CoreError::Storage(detail)),
    }
}

#[async_trait]
impl SubscriptionStore for FirestoreStore {
    async fn create(&self, subscription: &Subscription) -> Result<()> {
        let created = self
            .create_document(SUBSCRIPTIONS, &subscription.id, encode_subscription(subscription))
            .await?;
        if created {
            Ok(())
        } else {
            Err(CoreError::Conflict(format!(
                "subscription {} already exists",
                subscription.id
            )))
        }
    }

    async fn get(&self, id: &str) -> Result<Option<Subscription>> {
        self.get_document(SUBSCRIPTIONS, id)
            .await?
            .map(|doc| decode_subscription(doc.id(), &doc.fields))
            .transpose()
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Subscription>> {
        let mut result = self
            .query_equal(SUBSCRIPTIONS, "profile_id", owner_id)
            .await?
            .iter()
            .map(|doc| decode_subscription(doc.id(), &doc.fields))
            .collect::<Result<Vec<_>>>()?;
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn activate(
        &self,
        id: &str,
        activated_at: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<Activation> {
        let mut last_conflict = None;

        for attempt in 1..=ACTIVATE_ATTEMPTS {
            let doc = self
                .get_document(SUBSCRIPTIONS, id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("subscription {id}")))?;
            let mut subscription = decode_subscription(doc.id(), &doc.fields)?;

            match subscription.status {
                SubscriptionStatus::Active => return Ok(Activation::AlreadyActive(subscription)),
                SubscriptionStatus::Cancelled | SubscriptionStatus::Expired => {
                    return Ok(Activation::Inactive(subscription));
                }
                SubscriptionStatus::Pending => {}
            }

            subscription.activate(activated_at, end_date);
            let mut fields = Fields::new();
            fields.insert("status".into(), string(subscription.status.as_str()));
            fields.insert("start_date".into(), timestamp(activated_at));
            fields.insert("end_date".into(), timestamp(end_date));
            fields.insert("updated_at".into(), timestamp(activated_at));

            match self
                .patch_document(SUBSCRIPTIONS, id, fields, doc.update_time.as_deref())
                .await
            {
                Ok(()) => return Ok(Activation::Activated(subscription)),
                Err(CoreError::Conflict(detail)) => {
                    warn!(subscription_id = id, attempt, "Concurrent activation, re-reading");
                    last_conflict = Some(detail);
                }
                Err(e) => return Err(e),
            }
        }

        Err(CoreError::Conflict(last_conflict.unwrap_or_else(|| id.to_string())))
    }
}

#[async_trait]
impl InvoiceStore for FirestoreStore {
    async fn insert_if_absent(&self, invoice: &Invoice) -> Result<Insert<Invoice>> {
        if self
            .create_document(INVOICES, &invoice.id, encode_invoice(invoice))
            .await?
        {
            return Ok(Insert::Inserted(invoice.clone()));
        }

        let doc = self
            .get_document(INVOICES, &invoice.id)
            .await?
            .ok_or_else(|| CoreError::Storage(format!("invoice {} vanished after conflict", invoice.id)))?;
        Ok(Insert::Existing(decode_invoice(doc.id(), &doc.fields)?))
    }

    async fn get_by_reference(&self, payment_reference: &str) -> Result<Option<Invoice>> {
        self.get_document(INVOICES, &Invoice::key_for(payment_reference))
            .await?
            .map(|doc| decode_invoice(doc.id(), &doc.fields))
            .transpose()
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Invoice>> {
        let mut result = self
            .query_equal(INVOICES, "profile_id", owner_id)
            .await?
            .iter()
            .map(|doc| decode_invoice(doc.id(), &doc.fields))
            .collect::<Result<Vec<_>>>()?;
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn list_by_subscription(&self, subscription_id: &str) -> Result<Vec<Invoice>> {
        self.query_equal(INVOICES, "subscription_id", subscription_id)
            .await?
            .iter()
            .map(|doc| decode_invoice(doc.id(), &doc.fields))
            .collect()
    }
}

#[async_trait]
impl ContactStore for FirestoreStore {
    async fn insert_contact(&self, record: &ContactRecord) -> Result<()> {
        self.create_document(CONTACT_FORMS, &record.id, encode_contact(record))
            .await?;
        Ok(())
    }

    async fn mark_contact_relayed(&self, id: &str, sent_at: DateTime<Utc>) -> Result<()> {
        let mut fields = Fields::new();
        fields.insert("processed".into(), boolean(true));
        fields.insert("emailSent".into(), boolean(true));
        fields.insert("emailSentAt".into(), timestamp(sent_at));
        self.patch_document(CONTACT_FORMS, id, fields, None).await
    }

    async fn insert_inbound_email(&self, record: &InboundEmailRecord) -> Result<()> {
        self.create_document(INBOUND_EMAILS, &record.id, encode_inbound_email(record))
            .await?;
        Ok(())
    }

    async fn mark_inbound_email_processed(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut fields = Fields::new();
        fields.insert("processed".into(), boolean(true));
        fields.insert("updated_at".into(), timestamp(at));
        self.patch_document(INBOUND_EMAILS, id, fields, None).await
    }
}

// ---------------------------------------------------------------------------
// Value codecs
// ---------------------------------------------------------------------------

fn string(value: &str) -> Value {
    json!({ "stringValue": value })
}

fn boolean(value: bool) -> Value {
    json!({ "booleanValue": value })
}

fn double(value: Decimal) -> Value {
    json!({ "doubleValue": value.to_f64().unwrap_or_default() })
}

fn timestamp(value: DateTime<Utc>) -> Value {
    json!({ "timestampValue": value.to_rfc3339_opts(SecondsFormat::Micros, true) })
}

fn null() -> Value {
    json!({ "nullValue": null })
}

fn optional_string(value: Option<&str>) -> Value {
    value.map_or_else(null, string)
}

fn optional_timestamp(value: Option<DateTime<Utc>>) -> Value {
    value.map_or_else(null, timestamp)
}

/// Typed access to a decoded document's fields
struct FieldReader<'a> {
    id: &'a str,
    fields: &'a Fields,
}

impl<'a> FieldReader<'a> {
    fn new(id: &'a str, fields: &'a Fields) -> Self {
        Self { id, fields }
    }

    fn missing(&self, key: &str) -> CoreError {
        CoreError::Decode(format!("document {} has no usable field '{key}'", self.id))
    }

    fn raw(&self, key: &str, kind: &str) -> Option<&'a Value> {
        self.fields.get(key)?.get(kind)
    }

    fn is_null(&self, key: &str) -> bool {
        self.fields
            .get(key)
            .is_none_or(|v| v.get("nullValue").is_some())
    }

    fn string(&self, key: &str) -> Result<String> {
        self.raw(key, "stringValue")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| self.missing(key))
    }

    fn optional_string(&self, key: &str) -> Result<Option<String>> {
        if self.is_null(key) {
            return Ok(None);
        }
        self.string(key).map(Some)
    }

    fn parsed<T: FromStr<Err = CoreError>>(&self, key: &str) -> Result<T> {
        self.string(key)?
            .parse()
            .map_err(|e: CoreError| CoreError::Decode(format!("document {}: {e}", self.id)))
    }

    fn boolean(&self, key: &str) -> Result<bool> {
        self.raw(key, "booleanValue")
            .and_then(Value::as_bool)
            .ok_or_else(|| self.missing(key))
    }

    /// Money; accepts `doubleValue` or `integerValue`, rounded to cents
    fn decimal(&self, key: &str) -> Result<Decimal> {
        if let Some(v) = self.raw(key, "doubleValue").and_then(Value::as_f64) {
            return Decimal::try_from(v)
                .map(|d| d.round_dp(2))
                .map_err(|e| CoreError::Decode(format!("document {} field '{key}': {e}", self.id)));
        }
        // integerValue is transported as a JSON string
        self.raw(key, "integerValue")
            .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_i64().map(|i| i.to_string())))
            .and_then(|s| Decimal::from_str(&s).ok())
            .ok_or_else(|| self.missing(key))
    }

    fn timestamp(&self, key: &str) -> Result<DateTime<Utc>> {
        let raw = self
            .raw(key, "timestampValue")
            .and_then(Value::as_str)
            .ok_or_else(|| self.missing(key))?;
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| CoreError::Decode(format!("document {} field '{key}': {e}", self.id)))
    }

    fn optional_timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        if self.is_null(key) {
            return Ok(None);
        }
        self.timestamp(key).map(Some)
    }
}

fn encode_subscription(s: &Subscription) -> Fields {
    let mut f = Fields::new();
    f.insert("profile_id".into(), string(&s.owner_id));
    f.insert("type".into(), string(s.plan_type.as_str()));
    f.insert("term".into(), string(s.term.as_str()));
    f.insert("town".into(), string(&s.town));
    f.insert("price".into(), double(s.price));
    f.insert("design_service".into(), boolean(s.design_service_included));
    f.insert("status".into(), string(s.status.as_str()));
    f.insert("auto_renew".into(), boolean(s.auto_renew));
    f.insert("start_date".into(), timestamp(s.start_date));
    f.insert("end_date".into(), optional_timestamp(s.end_date));
    f.insert("created_at".into(), timestamp(s.created_at));
    f.insert("updated_at".into(), timestamp(s.updated_at));
    f
}

fn decode_subscription(id: &str, fields: &Fields) -> Result<Subscription> {
    let r = FieldReader::new(id, fields);
    Ok(Subscription {
        id: id.to_string(),
        owner_id: r.string("profile_id")?,
        plan_type: r.parsed("type")?,
        term: r.parsed("term")?,
        town: r.string("town")?,
        price: r.decimal("price")?,
        design_service_included: r.boolean("design_service")?,
        status: r.parsed("status")?,
        auto_renew: r.boolean("auto_renew")?,
        start_date: r.timestamp("start_date")?,
        end_date: r.optional_timestamp("end_date")?,
        created_at: r.timestamp("created_at")?,
        updated_at: r.timestamp("updated_at")?,
    })
}

fn encode_invoice(i: &Invoice) -> Fields {
    let mut f = Fields::new();
    f.insert("subscription_id".into(), string(&i.subscription_id));
    f.insert("profile_id".into(), string(&i.owner_id));
    f.insert("amount".into(), double(i.amount));
    f.insert("status".into(), string(i.status.as_str()));
    f.insert("payment_method".into(), string(i.payment_method.as_str()));
    f.insert("payment_reference".into(), string(&i.payment_reference));
    f.insert("invoice_number".into(), string(&i.invoice_number));
    f.insert("payment_date".into(), optional_timestamp(i.payment_date));
    f.insert("due_date".into(), timestamp(i.due_date));
    f.insert("created_at".into(), timestamp(i.created_at));
    f.insert("updated_at".into(), timestamp(i.updated_at));
    f
}

fn decode_invoice(id: &str, fields: &Fields) -> Result<Invoice> {
    let r = FieldReader::new(id, fields);
    Ok(Invoice {
        id: id.to_string(),
        subscription_id: r.string("subscription_id")?,
        owner_id: r.string("profile_id")?,
        amount: r.decimal("amount")?,
        status: r.parsed("status")?,
        payment_method: r.parsed("payment_method")?,
        payment_reference: r.string("payment_reference")?,
        invoice_number: r.string("invoice_number")?,
        payment_date: r.optional_timestamp("payment_date")?,
        due_date: r.timestamp("due_date")?,
        created_at: r.timestamp("created_at")?,
        updated_at: r.timestamp("updated_at")?,
    })
}

fn encode_contact(c: &ContactRecord) -> Fields {
    let mut f = Fields::new();
    f.insert("businessName".into(), string(&c.form.business_name));
    f.insert("industry".into(), string(&c.form.industry));
    f.insert("phoneNumber".into(), string(&c.form.phone_number));
    f.insert("email".into(), string(&c.form.email));
    f.insert("website".into(), optional_string(c.form.website.as_deref()));
    f.insert("townName".into(), string(&c.form.town_name));
    f.insert("processed".into(), boolean(c.processed));
    f.insert("emailSent".into(), boolean(c.email_sent));
    f.insert("emailSentAt".into(), optional_timestamp(c.email_sent_at));
    f.insert("created_at".into(), timestamp(c.created_at));
    f
}

fn encode_inbound_email(e: &InboundEmailRecord) -> Fields {
    let mut f = Fields::new();
    f.insert("from_email".into(), string(&e.from_email));
    f.insert("subject".into(), string(&e.subject));
    f.insert("text_content".into(), optional_string(e.text_content.as_deref()));
    f.insert("html_content".into(), optional_string(e.html_content.as_deref()));
    f.insert("has_attachments".into(), boolean(e.has_attachments));
    f.insert("processed".into(), boolean(e.processed));
    f.insert("received_at".into(), timestamp(e.received_at));
    f.insert("created_at".into(), timestamp(e.created_at));
    f.insert("updated_at".into(), timestamp(e.updated_at));
    f
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContactForm, NewSubscription, PaymentMethod, PlanType, Term};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 14, 16, 20, 0).unwrap()
    }

    fn subscription() -> Subscription {
        Subscription::pending(
            "sub_abc",
            NewSubscription {
                owner_id: "user_1".into(),
                plan_type: PlanType::Mini,
                term: Term::SixMonths,
                town: "billerica".into(),
                price: dec!(1915.00),
                design_service_included: true,
            },
            fixed_now(),
        )
    }

    #[test]
    fn test_document_url_escapes_id() {
        let store = FirestoreStore::new(FirestoreConfig {
            project_id: "spendlocal".into(),
            base_url: "http://localhost:8080/v1".into(),
            token: None,
            timeout: Duration::from_secs(1),
        })
        .unwrap();
        assert_eq!(
            store.document_url("invoices", "pay_venmo-3941"),
            "http://localhost:8080/v1/projects/spendlocal/databases/(default)/documents/invoices/pay_venmo-3941"
        );
        assert_eq!(
            store.document_url("invoices", "pay_a/../subscriptions/s?x=1#f"),
            "http://localhost:8080/v1/projects/spendlocal/databases/(default)/documents/invoices/pay_a%2F..%2Fsubscriptions%2Fs%3Fx%3D1%23f"
        );
    }

    #[test]
    fn test_subscription_codec_uses_persisted_names() {
        let fields = encode_subscription(&subscription());
        assert_eq!(fields["profile_id"], json!({ "stringValue": "user_1" }));
        assert_eq!(fields["type"], json!({ "stringValue": "mini" }));
        assert_eq!(fields["term"], json!({ "stringValue": "6months" }));
        assert_eq!(fields["price"], json!({ "doubleValue": 1915.0 }));
        assert_eq!(fields["end_date"], json!({ "nullValue": null }));
        assert_eq!(
            fields["start_date"],
            json!({ "timestampValue": "2025-05-14T16:20:00.000000Z" })
        );
    }

    #[test]
    fn test_subscription_codec_reads_back() {
        let mut original = subscription();
        original.activate(fixed_now(), Term::SixMonths.end_date_from(fixed_now()).unwrap());
        let decoded = decode_subscription("sub_abc", &encode_subscription(&original)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_invoice_codec_reads_back() {
        let invoice = Invoice::paid("sub_abc", "user_1", dec!(1915.00), PaymentMethod::Card, "cs_test_1", fixed_now());
        let fields = encode_invoice(&invoice);
        assert_eq!(fields["payment_method"], json!({ "stringValue": "card" }));
        let decoded = decode_invoice(&invoice.id, &fields).unwrap();
        assert_eq!(decoded, invoice);
    }

    #[test]
    fn test_amount_accepts_integer_value() {
        let mut fields = encode_invoice(&Invoice::paid("s", "u", dec!(550), PaymentMethod::Venmo, "ref", fixed_now()));
        fields.insert("amount".into(), json!({ "integerValue": "550" }));
        let decoded = decode_invoice("pay_ref", &fields).unwrap();
        assert_eq!(decoded.amount, dec!(550));
    }

    #[test]
    fn test_contact_codec_writes_null_website() {
        let form = ContactForm {
            business_name: "Main St Bakery".into(),
            industry: "Food".into(),
            phone_number: "555-0101".into(),
            email: "owner@bakery.test".into(),
            website: None,
            town_name: "Dracut".into(),
        };
        let record = ContactRecord::unprocessed("c_1", form, fixed_now());
        let fields = encode_contact(&record);
        assert_eq!(fields["website"], json!({ "nullValue": null }));
        assert_eq!(fields["townName"], json!({ "stringValue": "Dracut" }));
        assert_eq!(fields["processed"], json!({ "booleanValue": false }));

        let reader = FieldReader::new("c_1", &fields);
        assert_eq!(reader.optional_string("website").unwrap(), None);
        assert_eq!(reader.optional_timestamp("emailSentAt").unwrap(), None);
    }

    #[test]
    fn test_decode_reports_unknown_status() {
        let mut fields = encode_subscription(&subscription());
        fields.insert("status".into(), string("frozen"));
        let err = decode_subscription("sub_abc", &fields).unwrap_err();
        assert!(matches!(err, CoreError::Decode(_)));
    }

    #[test]
    fn test_decode_reports_missing_field() {
        let mut fields = encode_subscription(&subscription());
        fields.remove("town");
        assert!(matches!(
            decode_subscription("sub_abc", &fields),
            Err(CoreError::Decode(_))
        ));
    }

    #[test]
    fn test_document_id_from_name() {
        let doc = RawDocument {
            name: "projects/p/databases/(default)/documents/subscriptions/sub_9".into(),
            fields: Fields::new(),
            update_time: None,
        };
        assert_eq!(doc.id(), "sub_9");
    }
}
