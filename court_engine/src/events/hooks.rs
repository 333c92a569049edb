use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::events::{EventHandler, EventProducer, Handler, OrderEvent, SettlementEvent};

/// The publishing side of every registered hook. Cheap to clone, and handed to each engine API.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_producers: Vec<EventProducer<OrderEvent>>,
    pub settlement_producers: Vec<EventProducer<SettlementEvent>>,
}

impl std::fmt::Debug for EventProducers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EventProducers({} order, {} settlement)",
            self.order_producers.len(),
            self.settlement_producers.len()
        )
    }
}

impl EventProducers {
    pub fn publish_order_event(&self, event: OrderEvent) {
        for producer in &self.order_producers {
            producer.publish_event(event.clone());
        }
    }

    pub fn publish_order_events<I: IntoIterator<Item = OrderEvent>>(&self, events: I) {
        if self.order_producers.is_empty() {
            return;
        }
        for event in events {
            self.publish_order_event(event);
        }
    }

    pub fn publish_settlement_event(&self, event: SettlementEvent) {
        for producer in &self.settlement_producers {
            producer.publish_event(event.clone());
        }
    }
}

pub struct EventHandlers {
    pub on_order_event: Vec<EventHandler<OrderEvent>>,
    pub on_settlement_event: Vec<EventHandler<SettlementEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_event = hooks.on_order_event.into_iter().map(|f| EventHandler::new(buffer_size, f)).collect();
        let on_settlement_event =
            hooks.on_settlement_event.into_iter().map(|f| EventHandler::new(buffer_size, f)).collect();
        Self { on_order_event, on_settlement_event }
    }

    pub fn producers(&self) -> EventProducers {
        EventProducers {
            order_producers: self.on_order_event.iter().map(|h| h.subscribe()).collect(),
            settlement_producers: self.on_settlement_event.iter().map(|h| h.subscribe()).collect(),
        }
    }

    /// Spawns a task per handler. Call this after [`Self::producers`], since the handlers are consumed.
    pub fn start_handlers(self) {
        debug!(
            "📬️ Starting {} order hook(s) and {} settlement hook(s)",
            self.on_order_event.len(),
            self.on_settlement_event.len()
        );
        for handler in self.on_order_event {
            tokio::spawn(handler.start_handler());
        }
        for handler in self.on_settlement_event {
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_event: Vec<Handler<OrderEvent>>,
    pub on_settlement_event: Vec<Handler<SettlementEvent>>,
}

impl EventHooks {
    pub fn on_order_event<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_event.push(Arc::new(f));
        self
    }

    pub fn on_settlement_event<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(SettlementEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_settlement_event.push(Arc::new(f));
        self
    }
}
