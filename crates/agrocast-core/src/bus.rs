//! Synchronous signal bus.
//!
//! Components raise [`Signal`]s during the integrate phase; the bus delivers
//! each one immediately to every handler subscribed to its [`SignalId`], in
//! subscription order, before `publish` returns. Subscriptions are made
//! during setup and the bus is then sealed: no handler can be added or
//! removed while days are being stepped.
//!
//! A signal with no subscriber is an error rather than a silent drop, so a
//! wiring mistake surfaces on the first day it matters.

use std::collections::BTreeMap;

use agrocast_types::{AlertMessage, WeatherSignalKind};
use chrono::NaiveDate;

/// Errors raised by the signal bus.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BusError {
    /// A subscription was attempted after the bus was sealed.
    #[error("cannot subscribe to {id} after the bus is sealed")]
    Sealed {
        /// The signal the late subscription targeted.
        id: SignalId,
    },

    /// A signal was raised that nobody listens to.
    #[error("signal {id} has no subscriber")]
    Unhandled {
        /// The signal that was dropped.
        id: SignalId,
    },
}

/// Identifier used to route signals to handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SignalId {
    /// A weather-stress alert of the given kind.
    Weather(WeatherSignalKind),
    /// A management alert.
    ManagementEvent,
    /// The final growth stage was reached.
    CropFinish,
    /// The run must end after the current day.
    Terminate,
}

impl SignalId {
    /// Every signal identifier the engine can raise.
    pub fn all() -> Vec<Self> {
        let mut ids: Vec<Self> = WeatherSignalKind::ALL.into_iter().map(Self::Weather).collect();
        ids.extend([Self::ManagementEvent, Self::CropFinish, Self::Terminate]);
        ids
    }
}

impl core::fmt::Display for SignalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Weather(kind) => f.write_str(kind.as_str()),
            Self::ManagementEvent => f.write_str("MANAGEMENT_EVENT"),
            Self::CropFinish => f.write_str("CROP_FINISH"),
            Self::Terminate => f.write_str("TERMINATE"),
        }
    }
}

/// A signal raised during the integrate phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// A weather-stress streak reached its required duration.
    WeatherAlert {
        /// Which stress was detected.
        kind: WeatherSignalKind,
        /// The alert, dated at the onset of the streak.
        alert: AlertMessage,
    },
    /// A management rule's trigger stage was reached.
    ManagementAlert {
        /// The day the trigger stage was observed.
        trigger_day: NaiveDate,
        /// The alert, dated at the trigger day plus the rule's offset.
        alert: AlertMessage,
    },
    /// The stage sequence is exhausted.
    CropFinish {
        /// The day the final stage was entered.
        day: NaiveDate,
    },
    /// Request to end the run once the current day's integrate completes.
    Terminate {
        /// The day the request was raised.
        day: NaiveDate,
    },
}

impl Signal {
    /// The routing identifier of this signal.
    pub const fn id(&self) -> SignalId {
        match self {
            Self::WeatherAlert { kind, .. } => SignalId::Weather(*kind),
            Self::ManagementAlert { .. } => SignalId::ManagementEvent,
            Self::CropFinish { .. } => SignalId::CropFinish,
            Self::Terminate { .. } => SignalId::Terminate,
        }
    }
}

/// Receives signals from the bus.
///
/// Handlers run synchronously inside [`SignalBus::publish`]. They must not
/// try to drive the simulation themselves.
pub trait SignalHandler {
    /// Handle one delivered signal.
    fn handle(&mut self, signal: &Signal);
}

impl<F> SignalHandler for F
where
    F: FnMut(&Signal),
{
    fn handle(&mut self, signal: &Signal) {
        self(signal);
    }
}

/// Position of a handler in the bus, returned by [`SignalBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubscriptionId(usize);

/// Publish/subscribe channel scoped to one simulation run.
#[derive(Default)]
pub struct SignalBus {
    /// Handlers in subscription order.
    handlers: Vec<Box<dyn SignalHandler>>,
    /// Signal id -> handler positions, in subscription order.
    routes: BTreeMap<SignalId, Vec<usize>>,
    /// Once set, the routing table is frozen.
    sealed: bool,
}

impl core::fmt::Debug for SignalBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SignalBus")
            .field("handlers", &self.handlers.len())
            .field("routes", &self.routes)
            .field("sealed", &self.sealed)
            .finish()
    }
}

impl SignalBus {
    /// Create an empty, unsealed bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe one handler to each of `ids`.
    ///
    /// The handler is stored once; a signal matching any of the ids is
    /// delivered to it. Delivery order across handlers follows the order of
    /// `subscribe` calls.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Sealed`] if the bus has been sealed.
    pub fn subscribe<H>(&mut self, ids: &[SignalId], handler: H) -> Result<SubscriptionId, BusError>
    where
        H: SignalHandler + 'static,
    {
        if self.sealed {
            let id = ids.first().copied().unwrap_or(SignalId::Terminate);
            return Err(BusError::Sealed { id });
        }
        let position = self.handlers.len();
        self.handlers.push(Box::new(handler));
        for id in ids {
            let route = self.routes.entry(*id).or_default();
            if !route.contains(&position) {
                route.push(position);
            }
        }
        Ok(SubscriptionId(position))
    }

    /// Freeze the routing table. Further subscriptions fail.
    pub const fn seal(&mut self) {
        self.sealed = true;
    }

    /// Whether the bus has been sealed.
    pub const fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Number of handlers subscribed to `id`.
    pub fn subscriber_count(&self, id: SignalId) -> usize {
        self.routes.get(&id).map_or(0, Vec::len)
    }

    /// Deliver `signal` to its subscribers, in order, before returning.
    ///
    /// Returns the number of handlers that received the signal.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unhandled`] if no handler is subscribed to the
    /// signal's id.
    pub fn publish(&mut self, signal: &Signal) -> Result<usize, BusError> {
        let id = signal.id();
        let Some(route) = self.routes.get(&id) else {
            return Err(BusError::Unhandled { id });
        };
        let mut delivered: usize = 0;
        for position in route {
            if let Some(handler) = self.handlers.get_mut(*position) {
                handler.handle(signal);
                delivered = delivered.saturating_add(1);
            }
        }
        if delivered == 0 {
            return Err(BusError::Unhandled { id });
        }
        Ok(delivered)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()
    }

    #[test]
    fn handlers_run_in_subscription_order() {
        let log: Rc<RefCell<Vec<&'static str>>> = Rc::default();
        let mut bus = SignalBus::new();

        let first = Rc::clone(&log);
        bus.subscribe(&[SignalId::Terminate], move |_: &Signal| {
            first.borrow_mut().push("first");
        })
        .unwrap();
        let second = Rc::clone(&log);
        bus.subscribe(&[SignalId::Terminate], move |_: &Signal| {
            second.borrow_mut().push("second");
        })
        .unwrap();
        bus.seal();

        let delivered = bus.publish(&Signal::Terminate { day: day() }).unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn delivery_is_synchronous() {
        let seen: Rc<RefCell<Option<NaiveDate>>> = Rc::default();
        let mut bus = SignalBus::new();
        let sink = Rc::clone(&seen);
        bus.subscribe(&[SignalId::CropFinish], move |signal: &Signal| {
            if let Signal::CropFinish { day } = signal {
                *sink.borrow_mut() = Some(*day);
            }
        })
        .unwrap();
        bus.seal();

        bus.publish(&Signal::CropFinish { day: day() }).unwrap();
        // Visible immediately after publish returns.
        assert_eq!(*seen.borrow(), Some(day()));
    }

    #[test]
    fn unhandled_signal_is_an_error() {
        let mut bus = SignalBus::new();
        bus.seal();
        let result = bus.publish(&Signal::Terminate { day: day() });
        assert_eq!(
            result,
            Err(BusError::Unhandled {
                id: SignalId::Terminate
            })
        );
    }

    #[test]
    fn sealed_bus_rejects_subscriptions() {
        let mut bus = SignalBus::new();
        bus.seal();
        let result = bus.subscribe(&[SignalId::ManagementEvent], |_: &Signal| {});
        assert!(matches!(result, Err(BusError::Sealed { .. })));
    }

    #[test]
    fn one_handler_can_cover_several_ids() {
        let count: Rc<RefCell<u32>> = Rc::default();
        let mut bus = SignalBus::new();
        let sink = Rc::clone(&count);
        bus.subscribe(&SignalId::all(), move |_: &Signal| {
            *sink.borrow_mut() += 1;
        })
        .unwrap();
        bus.seal();

        bus.publish(&Signal::CropFinish { day: day() }).unwrap();
        bus.publish(&Signal::Terminate { day: day() }).unwrap();
        assert_eq!(*count.borrow(), 2);
        assert_eq!(bus.subscriber_count(SignalId::ManagementEvent), 1);
    }
}
