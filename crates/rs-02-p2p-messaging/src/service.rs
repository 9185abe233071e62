//! # P2P Messaging Service
//!
//! Owns the validator and handler registries and drives the transport:
//!
//! 1. subscribe to every topic that has a validator, a handler or was added
//!    with [`P2PMessaging::add_gossip_topic`]
//! 2. bootstrap according to the [`BootstrapPlan`]
//! 3. for every inbound message: decode the envelope, run the topic's
//!    validators, report the combined result to peer scoring and, on
//!    accept, run the handlers and publish what they return
//!
//! Validators registered for topic T only ever see messages decoded from T.

use std::collections::{BTreeSet, HashMap};
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use rs_01_p2p_schema::{envelope, Message, P2PMessage, TraceContext, Topic};
use shared_types::{retry, RetryOptions};
use shutter_telemetry::metrics::{
    P2P_HANDLING_SECONDS, P2P_MESSAGES_REJECTED, P2P_VALIDATION_SECONDS,
};
use shutter_telemetry::{HistogramTimer, TracingHandle};
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};

use crate::domain::{
    combine, BootstrapPlan, HandlerError, MessagingError, PeerId, TransportError,
    ValidationError, ValidationResult,
};
use crate::ports::{GossipTransport, InboundMessage, MessageHandler, MessageSender, MessageValidator};

// =============================================================================
// TYPE ERASURE
// =============================================================================

#[async_trait]
trait TopicValidator: Send + Sync {
    async fn validate(&self, message: &P2PMessage) -> Result<ValidationResult, ValidationError>;
}

#[async_trait]
trait TopicHandler: Send + Sync {
    async fn handle(&self, message: &P2PMessage) -> Result<Vec<P2PMessage>, HandlerError>;
}

struct Typed<M, V: ?Sized> {
    inner: Arc<V>,
    _message: PhantomData<fn() -> M>,
}

impl<M, V: ?Sized> Typed<M, V> {
    fn new(inner: Arc<V>) -> Self {
        Self {
            inner,
            _message: PhantomData,
        }
    }
}

#[async_trait]
impl<M, V> TopicValidator for Typed<M, V>
where
    M: Message,
    V: MessageValidator<M> + ?Sized + 'static,
{
    async fn validate(&self, message: &P2PMessage) -> Result<ValidationResult, ValidationError> {
        let typed = M::from_p2p(message.clone()).ok_or_else(|| {
            ValidationError::invalid(format!("unexpected message on topic {}", M::TOPIC))
        })?;
        self.inner.validate(&typed).await
    }
}

#[async_trait]
impl<M, H> TopicHandler for Typed<M, H>
where
    M: Message,
    H: MessageHandler<M> + ?Sized + 'static,
{
    async fn handle(&self, message: &P2PMessage) -> Result<Vec<P2PMessage>, HandlerError> {
        let Some(typed) = M::from_p2p(message.clone()) else {
            return Ok(Vec::new());
        };
        self.inner.handle(&typed).await
    }
}

// =============================================================================
// SENDER
// =============================================================================

/// Cloneable publish handle. Attaches the current trace context when
/// propagation is enabled and retries failed publishes.
pub struct P2PSender<T: GossipTransport> {
    transport: Arc<T>,
    tracing: TracingHandle,
    retry: RetryOptions,
}

impl<T: GossipTransport> Clone for P2PSender<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            tracing: self.tracing,
            retry: self.retry.clone(),
        }
    }
}

#[async_trait]
impl<T: GossipTransport + 'static> MessageSender for P2PSender<T> {
    async fn send_message(&self, message: P2PMessage) -> Result<(), MessagingError> {
        let trace = self
            .tracing
            .current()
            .and_then(|ctx| TraceContext::from_propagated(&ctx));
        let data = envelope::marshal(&message, trace)?;
        let topic = message.topic();

        let transport = &self.transport;
        retry(&self.retry, "publish", move || {
            let data = data.clone();
            async move { transport.publish(topic, data).await }
        })
        .await?;

        debug!(%topic, message = %message.log_info(), "sent message");
        Ok(())
    }
}

// =============================================================================
// SERVICE
// =============================================================================

/// Validated, typed gossip messaging on top of a [`GossipTransport`].
pub struct P2PMessaging<T: GossipTransport> {
    transport: Arc<T>,
    plan: BootstrapPlan,
    tracing: TracingHandle,
    validators: HashMap<Topic, Vec<Arc<dyn TopicValidator>>>,
    handlers: HashMap<Topic, Vec<Arc<dyn TopicHandler>>>,
    gossip_topics: BTreeSet<Topic>,
    publish_retry: RetryOptions,
}

impl<T: GossipTransport + 'static> P2PMessaging<T> {
    pub fn new(transport: Arc<T>, plan: BootstrapPlan, tracing: TracingHandle) -> Self {
        Self {
            transport,
            plan,
            tracing,
            validators: HashMap::new(),
            handlers: HashMap::new(),
            gossip_topics: BTreeSet::new(),
            publish_retry: RetryOptions::default(),
        }
    }

    pub fn with_publish_retry(mut self, options: RetryOptions) -> Self {
        self.publish_retry = options;
        self
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.transport.local_peer_id()
    }

    /// Register `handler` as validator and handler for `M`'s topic.
    pub fn add_message_handler<M, H>(&mut self, handler: Arc<H>)
    where
        M: Message,
        H: MessageHandler<M> + 'static,
    {
        self.validators
            .entry(M::TOPIC)
            .or_default()
            .push(Arc::new(Typed::<M, H>::new(Arc::clone(&handler))));
        self.handlers
            .entry(M::TOPIC)
            .or_default()
            .push(Arc::new(Typed::<M, H>::new(handler)));
    }

    /// Register an additional validator for `M`'s topic.
    pub fn add_validator<M, V>(&mut self, validator: Arc<V>)
    where
        M: Message,
        V: MessageValidator<M> + 'static,
    {
        self.validators
            .entry(M::TOPIC)
            .or_default()
            .push(Arc::new(Typed::<M, V>::new(validator)));
    }

    /// Subscribe to `topic` without local handlers, e.g. to relay it.
    pub fn add_gossip_topic(&mut self, topic: Topic) {
        self.gossip_topics.insert(topic);
    }

    pub fn topics(&self) -> BTreeSet<Topic> {
        self.validators
            .keys()
            .chain(self.handlers.keys())
            .chain(self.gossip_topics.iter())
            .copied()
            .collect()
    }

    pub fn sender(&self) -> P2PSender<T> {
        P2PSender {
            transport: Arc::clone(&self.transport),
            tracing: self.tracing,
            retry: self.publish_retry.clone(),
        }
    }

    /// Run until `shutdown` flips to `true` or the transport closes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), MessagingError> {
        for topic in self.topics() {
            self.transport.subscribe(topic).await?;
        }
        info!(
            peer_id = %self.local_peer_id(),
            topics = ?self.topics(),
            bootstrap_node = self.plan.is_bootstrap_node,
            "p2p messaging started"
        );

        self.start_bootstrap().await?;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("p2p messaging stopping");
                        return Ok(());
                    }
                }
                message = self.transport.next_message() => {
                    let Some(message) = message else {
                        warn!("transport closed");
                        return Err(TransportError::Closed.into());
                    };
                    self.process(message).await;
                }
            }
        }
    }

    /// Regular nodes bootstrap inline and fail on exhaustion. Bootstrap
    /// nodes keep trying in the background.
    async fn start_bootstrap(&self) -> Result<(), MessagingError> {
        let Some(options) = self.plan.retry_options() else {
            info!("no bootstrap peers to connect to, skipping bootstrap");
            return Ok(());
        };
        let peers: Vec<PeerId> = self.plan.peer_ids().collect();

        if self.plan.failure_is_fatal() {
            return bootstrap(self.transport.as_ref(), &peers, &options).await;
        }

        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            if let Err(e) = bootstrap(transport.as_ref(), &peers, &options).await {
                error!(error = %e, "failed to bootstrap");
            }
        });
        Ok(())
    }

    async fn process(&self, inbound: InboundMessage) {
        let topic = inbound.topic;

        let received = match envelope::unmarshal(topic.as_str(), &inbound.data, &self.tracing) {
            Ok(received) => received,
            Err(e) => {
                debug!(%topic, from = %inbound.from, error = %e, "dropping undecodable message");
                self.transport
                    .report_validation(&inbound, ValidationResult::Reject);
                P2P_MESSAGES_REJECTED.with_label_values(&[topic.as_str()]).inc();
                return;
            }
        };
        let parent = received.trace.as_ref().map(TraceContext::to_propagated);
        let span = self.tracing.receive_span(topic.as_str(), parent.as_ref());

        async {
            let result = self.validate(topic, &received.message).await;
            self.transport.report_validation(&inbound, result);
            match result {
                ValidationResult::Accept => self.handle(topic, &received.message).await,
                ValidationResult::Ignore => {
                    debug!(%topic, message = %received.message.log_info(), "ignoring message");
                }
                ValidationResult::Reject => {
                    P2P_MESSAGES_REJECTED.with_label_values(&[topic.as_str()]).inc();
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn validate(&self, topic: Topic, message: &P2PMessage) -> ValidationResult {
        let _timer = HistogramTimer::new(&P2P_VALIDATION_SECONDS, topic.as_str());
        let Some(validators) = self.validators.get(&topic) else {
            return ValidationResult::Accept;
        };

        let mut results = Vec::with_capacity(validators.len());
        for validator in validators {
            let result = match validator.validate(message).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(%topic, message = %message.log_info(), error = %e, "message validation failed");
                    ValidationResult::Reject
                }
            };
            results.push(result);
        }
        combine(results)
    }

    async fn handle(&self, topic: Topic, message: &P2PMessage) {
        let _timer = HistogramTimer::new(&P2P_HANDLING_SECONDS, topic.as_str());
        let Some(handlers) = self.handlers.get(&topic) else {
            debug!(%topic, "no handler registered for topic");
            return;
        };

        let mut outgoing = Vec::new();
        for handler in handlers {
            match handler.handle(message).await {
                Ok(mut messages) => outgoing.append(&mut messages),
                Err(e) => {
                    error!(%topic, message = %message.log_info(), error = %e, "error handling message");
                }
            }
        }

        let sender = self.sender();
        for message in outgoing {
            if let Err(e) = sender.send_message(message).await {
                error!(error = %e, "error sending message");
            }
        }
    }
}

/// Connect to the bootstrap peers. Succeeds once at least one peer was
/// reached in an attempt.
pub async fn bootstrap<T>(
    transport: &T,
    peers: &[PeerId],
    options: &RetryOptions,
) -> Result<(), MessagingError>
where
    T: GossipTransport + ?Sized,
{
    retry(options, "bootstrap", move || async move {
        let mut connected = 0usize;
        for peer in peers {
            match transport.connect(peer).await {
                Ok(()) => connected += 1,
                Err(e) => debug!(%peer, error = %e, "could not connect to bootstrap peer"),
            }
        }
        if connected == 0 {
            return Err(MessagingError::BootstrapUnreachable);
        }
        info!(connected, "connected to bootstrap peers");
        Ok(())
    })
    .await
}

#[async_trait]
impl<T: GossipTransport + 'static> MessageSender for P2PMessaging<T> {
    async fn send_message(&self, message: P2PMessage) -> Result<(), MessagingError> {
        self.sender().send_message(message).await
    }
}
