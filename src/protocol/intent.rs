//! Intents, cats and peer intents.
//!
//! An [`Intent`] is what a page declares it can do. Normalization expands
//! each intent into one [`Cat`] per form, preserving declaration order
//! (the matcher's tie-break depends on it). A [`PeerIntent`] is what the
//! other side declared, validated after crossing the transport.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{CatsError, Result};
use crate::exchange::{
    self, AutoReply, ClosingSignal, Connector, ConsumerFn, DataArray, Offer, Port, PostOffer,
    PostResult, PostingConsumerFn, PostingProducerFn, Producer,
};

/// Free-form capability metadata.
pub type Having = Map<String, Value>;

/// Role polarity; a match requires opposite sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Receives an offer and replies
    Accepting,
    /// Sends an offer and awaits the reply
    Offering,
}

impl Side {
    /// The side a peer must be on to match this one.
    pub fn opposite(self) -> Self {
        match self {
            Self::Accepting => Self::Offering,
            Self::Offering => Self::Accepting,
        }
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepting => "accepting",
            Self::Offering => "offering",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "accepting" => Ok(Self::Accepting),
            "offering" => Ok(Self::Offering),
            _ => Err(format!("Unknown side: {s}")),
        }
    }
}

/// How an intent takes part in the exchange, one variant per
/// (behavior kind, side).
#[derive(Clone)]
pub enum Behavior {
    /// Accept the offer. The consumer (default: hand back the offer itself)
    /// settles the session value; with `replying` that value is also the
    /// result, otherwise `null` is posted.
    Accepting {
        /// Optional consumer callback
        consumer: Option<ConsumerFn>,
        /// Post the consumer's value back as the result
        replying: bool,
    },
    /// Accept with a consumer that may post the result itself.
    AcceptingPosting(PostingConsumerFn),
    /// Accept with direct control of the exchange port.
    AcceptingConnect(Connector),
    /// Offer a literal value or the output of a producer callback.
    Offering(Producer),
    /// Offer through a producer that posts the offer itself.
    OfferingPosting(PostingProducerFn),
    /// Offer with direct control of the exchange port.
    OfferingConnect(Connector),
}

impl Behavior {
    /// Side this behavior plays.
    pub fn side(&self) -> Side {
        match self {
            Self::Accepting { .. } | Self::AcceptingPosting(_) | Self::AcceptingConnect(_) => {
                Side::Accepting
            }
            Self::Offering(_) | Self::OfferingPosting(_) | Self::OfferingConnect(_) => {
                Side::Offering
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Accepting { .. } => "accepting",
            Self::AcceptingPosting(_) => "accepting-posting",
            Self::AcceptingConnect(_) => "accepting-connect",
            Self::Offering(_) => "offering",
            Self::OfferingPosting(_) => "offering-posting",
            Self::OfferingConnect(_) => "offering-connect",
        }
    }

    /// Lower the behavior to a connector over the exchange port.
    fn to_connector(&self) -> Connector {
        match self.clone() {
            Self::Accepting { consumer, replying } => {
                let consumer = wrap_basic_consumer(consumer);
                let auto_reply = if replying {
                    AutoReply::Settled
                } else {
                    AutoReply::Null
                };
                exchange::connector(move |port, peer, closing| {
                    exchange::receive(consumer.clone(), auto_reply, port, peer, closing)
                })
            }
            Self::AcceptingPosting(consumer) => exchange::connector(move |port, peer, closing| {
                exchange::receive(consumer.clone(), AutoReply::Settled, port, peer, closing)
            }),
            Self::Offering(producer) => exchange::connector(move |port, peer, closing| {
                exchange::send(producer.clone(), port, peer, closing)
            }),
            Self::OfferingPosting(producer) => exchange::connector(move |port, peer, closing| {
                exchange::send_posting(producer.clone(), port, peer, closing)
            }),
            Self::AcceptingConnect(connect) | Self::OfferingConnect(connect) => connect,
        }
    }
}

impl std::fmt::Debug for Behavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn wrap_basic_consumer(consumer: Option<ConsumerFn>) -> PostingConsumerFn {
    match consumer {
        Some(consumer) => exchange::posting_consumer(move |offer, peer, closing, _post| {
            consumer(offer, peer, closing)
        }),
        None => exchange::posting_consumer(|offer: Offer, _peer, _closing, _post| async move {
            Ok(offer.data.raw().clone())
        }),
    }
}

/// A declared capability: one or more forms sharing a behavior.
#[derive(Debug, Clone)]
pub struct Intent {
    forms: Vec<String>,
    having: Having,
    behavior: Behavior,
}

impl Intent {
    /// Create an intent from parts.
    pub fn new(form: impl Into<String>, behavior: Behavior) -> Self {
        Self {
            forms: vec![form.into()],
            having: Having::new(),
            behavior,
        }
    }

    /// Accept `form`, resolving with the offer itself and replying `null`.
    pub fn accepting(form: impl Into<String>) -> Self {
        Self::new(
            form,
            Behavior::Accepting {
                consumer: None,
                replying: false,
            },
        )
    }

    /// Accept `form` through a consumer callback.
    pub fn accepting_with<F, Fut>(form: impl Into<String>, consumer: F) -> Self
    where
        F: Fn(Offer, PeerIntent, ClosingSignal) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
    {
        Self::new(
            form,
            Behavior::Accepting {
                consumer: Some(exchange::consumer(consumer)),
                replying: false,
            },
        )
    }

    /// Accept `form` through a consumer that may post the result itself.
    pub fn accepting_posting<F, Fut>(form: impl Into<String>, consumer: F) -> Self
    where
        F: Fn(Offer, PeerIntent, ClosingSignal, PostResult) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
    {
        Self::new(
            form,
            Behavior::AcceptingPosting(exchange::posting_consumer(consumer)),
        )
    }

    /// Accept `form` with direct control of the exchange port.
    pub fn accepting_connect<F, Fut>(form: impl Into<String>, connect: F) -> Self
    where
        F: Fn(Port, PeerIntent, ClosingSignal) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<DataArray>> + Send + 'static,
    {
        Self::new(form, Behavior::AcceptingConnect(exchange::connector(connect)))
    }

    /// Offer a literal value as `form`.
    pub fn offering(form: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(form, Behavior::Offering(Producer::Value(value.into())))
    }

    /// Offer the output of a producer callback as `form`.
    pub fn offering_with<F, Fut>(form: impl Into<String>, producer: F) -> Self
    where
        F: Fn(PeerIntent, ClosingSignal) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
    {
        Self::new(form, Behavior::Offering(Producer::callback(producer)))
    }

    /// Offer `form` through a producer that posts the offer itself.
    pub fn offering_posting<F, Fut>(form: impl Into<String>, producer: F) -> Self
    where
        F: Fn(PeerIntent, ClosingSignal, PostOffer) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
    {
        Self::new(
            form,
            Behavior::OfferingPosting(exchange::posting_producer(producer)),
        )
    }

    /// Offer `form` with direct control of the exchange port.
    pub fn offering_connect<F, Fut>(form: impl Into<String>, connect: F) -> Self
    where
        F: Fn(Port, PeerIntent, ClosingSignal) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<DataArray>> + Send + 'static,
    {
        Self::new(form, Behavior::OfferingConnect(exchange::connector(connect)))
    }

    /// Add further forms; each becomes its own cat, in order.
    pub fn with_forms<I, S>(mut self, forms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forms.extend(forms.into_iter().map(Into::into));
        self
    }

    /// Replace the metadata.
    pub fn with_having(mut self, having: Having) -> Self {
        self.having = having;
        self
    }

    /// Add one metadata entry.
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.having.insert(key.to_string(), value.into());
        self
    }

    /// Post the consumer's value back as the result (basic accepting only).
    pub fn replying(mut self) -> Self {
        if let Behavior::Accepting { replying, .. } = &mut self.behavior {
            *replying = true;
        }
        self
    }

    /// Side of this intent.
    pub fn side(&self) -> Side {
        self.behavior.side()
    }

    /// Declared forms.
    pub fn forms(&self) -> &[String] {
        &self.forms
    }

    /// Declared metadata.
    pub fn having(&self) -> &Having {
        &self.having
    }

    /// Behavior.
    pub fn behavior(&self) -> &Behavior {
        &self.behavior
    }

    /// Parse a raw declaration.
    ///
    /// Accepted shapes:
    ///
    /// ```json
    /// {"offering": "text", "value": "hello", "having": {}}
    /// {"accepting": ["text", "html"], "replying": true}
    /// ```
    pub fn from_value(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or(CatsError::MatcherNotAnObject)?;

        let (side, forms) = match (object.get("accepting"), object.get("offering")) {
            (Some(forms), None) => (Side::Accepting, forms),
            (None, Some(forms)) => (Side::Offering, forms),
            _ => return Err(CatsError::MatcherSideAmbiguous),
        };

        let forms = match forms {
            Value::String(form) => vec![form.clone()],
            Value::Array(entries) => entries
                .iter()
                .map(|entry| {
                    entry
                        .as_str()
                        .map(str::to_string)
                        .ok_or(CatsError::MatcherFormNotAString)
                })
                .collect::<Result<Vec<_>>>()?,
            _ => return Err(CatsError::MatcherFormNotAString),
        };

        let having = match object.get("having") {
            None | Some(Value::Null) => Having::new(),
            Some(Value::Object(having)) => having.clone(),
            Some(_) => return Err(CatsError::MatcherNotAnObject),
        };

        let behavior = match side {
            Side::Accepting => Behavior::Accepting {
                consumer: None,
                replying: object
                    .get("replying")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            Side::Offering => Behavior::Offering(Producer::Value(
                object.get("value").cloned().unwrap_or(Value::Null),
            )),
        };

        Ok(Self {
            forms,
            having,
            behavior,
        })
    }
}

/// Single-form normalized capability.
#[derive(Clone)]
pub struct Cat {
    side: Side,
    form: String,
    having: Having,
    connect: Connector,
}

impl Cat {
    /// Side of this cat.
    pub fn side(&self) -> Side {
        self.side
    }

    /// Form of this cat.
    pub fn form(&self) -> &str {
        &self.form
    }

    /// Metadata of this cat.
    pub fn having(&self) -> &Having {
        &self.having
    }

    /// The serializable `(side, form, having)` triple. The behavior is never
    /// serialized.
    pub fn descriptor(&self) -> Value {
        json!({
            "side": self.side,
            "form": self.form,
            "having": self.having,
        })
    }

    /// Run this cat's exchange over `port`.
    pub fn connect(
        &self,
        port: Port,
        peer: PeerIntent,
        closing: ClosingSignal,
    ) -> futures::future::BoxFuture<'static, Result<DataArray>> {
        (self.connect)(port, peer, closing)
    }
}

impl std::fmt::Debug for Cat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cat")
            .field("side", &self.side)
            .field("form", &self.form)
            .field("having", &self.having)
            .finish_non_exhaustive()
    }
}

/// Expand intents into cats, one per form, in declaration order.
pub fn normalize(intents: &[Intent]) -> Vec<Cat> {
    intents
        .iter()
        .flat_map(|intent| {
            let connect = intent.behavior.to_connector();
            let side = intent.side();
            intent.forms.iter().map(move |form| Cat {
                side,
                form: form.clone(),
                having: intent.having.clone(),
                connect: connect.clone(),
            })
        })
        .collect()
}

/// Normalize a raw declaration or list of declarations.
pub fn normalize_value(value: &Value) -> Result<Vec<Cat>> {
    Ok(normalize(&intents_from_value(value)?))
}

/// Parse a raw declaration or list of declarations into intents.
pub fn intents_from_value(value: &Value) -> Result<Vec<Intent>> {
    match value {
        Value::Array(entries) => entries.iter().map(Intent::from_value).collect(),
        other => Ok(vec![Intent::from_value(other)?]),
    }
}

/// A capability declared by the peer, plus the peer's origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerIntent {
    /// Origin the declaration arrived from
    pub origin: String,
    /// Peer's side
    pub side: Side,
    /// Peer's form
    pub form: String,
    /// Peer's metadata
    #[serde(default)]
    pub having: Having,
}

impl PeerIntent {
    /// Create a peer intent with empty metadata.
    pub fn new(origin: impl Into<String>, side: Side, form: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            side,
            form: form.into(),
            having: Having::new(),
        }
    }

    /// Validate raw `(side, form, having)` fields.
    ///
    /// A missing or `null` having defaults to empty. Returns the reason on
    /// failure so callers can pick their own error.
    pub fn parse(
        origin: &str,
        side: &Value,
        form: &Value,
        having: &Value,
    ) -> std::result::Result<Self, String> {
        let side = side
            .as_str()
            .ok_or_else(|| "side is not a string".to_string())?
            .parse::<Side>()?;
        let form = form
            .as_str()
            .ok_or_else(|| "form is not a string".to_string())?;
        let having = match having {
            Value::Null => Having::new(),
            Value::Object(having) => having.clone(),
            _ => return Err("having is not an object".to_string()),
        };

        Ok(Self {
            origin: origin.to_string(),
            side,
            form: form.to_string(),
            having,
        })
    }

    /// Validate one entry of a capabilities list.
    pub fn from_entry(origin: &str, entry: &Value) -> std::result::Result<Self, String> {
        let object = entry
            .as_object()
            .ok_or_else(|| "entry is not an object".to_string())?;
        Self::parse(
            origin,
            object.get("side").unwrap_or(&Value::Null),
            object.get("form").unwrap_or(&Value::Null),
            object.get("having").unwrap_or(&Value::Null),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forms_expand_in_place() {
        let intents = vec![
            Intent::accepting("a").with_forms(["b", "c"]),
            Intent::offering("d", "x"),
        ];
        let cats = normalize(&intents);

        let forms: Vec<_> = cats.iter().map(Cat::form).collect();
        assert_eq!(forms, ["a", "b", "c", "d"]);
        assert_eq!(cats[2].side(), Side::Accepting);
        assert_eq!(cats[3].side(), Side::Offering);
    }

    #[test]
    fn test_having_defaults_to_empty() {
        let cats = normalize(&[Intent::accepting("text")]);
        assert!(cats[0].having().is_empty());
        assert_eq!(
            cats[0].descriptor(),
            json!({"side": "accepting", "form": "text", "having": {}})
        );
    }

    #[test]
    fn test_having_is_shared_across_forms() {
        let cats = normalize(&[Intent::offering("a", 1)
            .with_forms(["b"])
            .with_meta("lang", "en")]);
        assert_eq!(cats[0].having(), cats[1].having());
        assert_eq!(cats[1].having()["lang"], json!("en"));
    }

    #[test]
    fn test_from_value_shapes() {
        let cats = normalize_value(&json!([
            {"offering": "text", "value": "hello", "having": {"v": 1}},
            {"accepting": ["json", "html"], "replying": true}
        ]))
        .unwrap();

        assert_eq!(cats.len(), 3);
        assert_eq!(cats[0].side(), Side::Offering);
        assert_eq!(cats[0].having()["v"], json!(1));
        assert_eq!(cats[2].form(), "html");
    }

    #[test]
    fn test_from_value_single_object() {
        let cats = normalize_value(&json!({"accepting": "text"})).unwrap();
        assert_eq!(cats.len(), 1);
    }

    #[test]
    fn test_from_value_errors() {
        assert!(matches!(
            normalize_value(&json!("text")),
            Err(CatsError::MatcherNotAnObject)
        ));
        assert!(matches!(
            normalize_value(&json!({"accepting": "a", "offering": "b"})),
            Err(CatsError::MatcherSideAmbiguous)
        ));
        assert!(matches!(
            normalize_value(&json!({"having": {}})),
            Err(CatsError::MatcherSideAmbiguous)
        ));
        assert!(matches!(
            normalize_value(&json!({"accepting": ["ok", 3]})),
            Err(CatsError::MatcherFormNotAString)
        ));
        assert!(matches!(
            normalize_value(&json!({"offering": 7})),
            Err(CatsError::MatcherFormNotAString)
        ));
    }

    #[test]
    fn test_replying_only_affects_basic_accepting() {
        let intent = Intent::accepting("text").replying();
        assert!(matches!(
            intent.behavior(),
            Behavior::Accepting { replying: true, .. }
        ));

        let intent = Intent::offering("text", 1).replying();
        assert!(matches!(intent.behavior(), Behavior::Offering(_)));
    }

    #[test]
    fn test_peer_intent_parse() {
        let peer = PeerIntent::from_entry(
            "https://a.example",
            &json!({"side": "offering", "form": "text"}),
        )
        .unwrap();
        assert_eq!(peer.side, Side::Offering);
        assert!(peer.having.is_empty());

        assert!(PeerIntent::from_entry("o", &json!({"side": "sideways", "form": "t"})).is_err());
        assert!(PeerIntent::from_entry("o", &json!({"side": "offering", "form": 1})).is_err());
        assert!(PeerIntent::from_entry(
            "o",
            &json!({"side": "offering", "form": "t", "having": []})
        )
        .is_err());
        assert!(PeerIntent::from_entry("o", &json!(["offering", "t"])).is_err());
    }

    #[test]
    fn test_side_round_trip_names() {
        assert_eq!("accepting".parse::<Side>().unwrap(), Side::Accepting);
        assert_eq!(Side::Offering.opposite(), Side::Accepting);
        assert_eq!(Side::Offering.to_string(), "offering");
    }
}
