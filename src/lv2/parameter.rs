//! Host-facing parameters, one per input control port.
//!
//! Values flow two ways and the paths are not symmetric:
//!
//! - [`Parameter::set_value`] is the owner changing the parameter. The new
//!   value is cached and written to the plugin port through the port
//!   event queue.
//! - [`Parameter::update`] is the plugin reporting a port value. Only the
//!   cached value changes (and listeners hear about it); nothing is written
//!   back, so a notification can never echo into another write.

use std::sync::Arc;

use parking_lot::Mutex;

use super::port_event::PortWriter;
use super::{AtomicF32, ParameterValue, PortDeclaration};
use crate::error::Result;

/// Declared control range. Unset (NaN) bounds fall back to 0..1 and an
/// unset default to the minimum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterRange {
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

impl ParameterRange {
    pub fn new(min: f32, max: f32, default: f32) -> Self {
        let min = if min.is_nan() { 0.0 } else { min };
        let max = if max.is_nan() { 1.0 } else { max };
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let default = if default.is_nan() {
            min
        } else {
            default.clamp(min, max)
        };
        Self { min, max, default }
    }

    pub fn to_normalized(&self, plain: f32) -> f32 {
        let span = self.max - self.min;
        if span <= 0.0 || plain.is_nan() {
            return 0.0;
        }
        ((plain - self.min) / span).clamp(0.0, 1.0)
    }

    pub fn from_normalized(&self, normalized: f32) -> f32 {
        let n = if normalized.is_nan() {
            0.0
        } else {
            normalized.clamp(0.0, 1.0)
        };
        self.min + (self.max - self.min) * n
    }
}

pub trait ParameterListener: Send + Sync {
    /// Called with the new normalized value.
    fn value_changed(&self, port: u32, normalized: f32);
}

pub struct Parameter {
    port: u32,
    symbol: String,
    name: String,
    range: ParameterRange,
    /// Normalized value.
    value: AtomicF32,
    writer: Arc<PortWriter>,
    listeners: Mutex<Vec<Arc<dyn ParameterListener>>>,
}

impl Parameter {
    pub fn new(decl: &PortDeclaration, writer: Arc<PortWriter>) -> Self {
        let range = ParameterRange::new(decl.min, decl.max, decl.default);
        Self {
            port: decl.index,
            symbol: decl.symbol.clone(),
            name: decl.name.clone(),
            value: AtomicF32::new(range.to_normalized(range.default)),
            range,
            writer,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn port(&self) -> u32 {
        self.port
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name cut to at most `max_len` characters.
    pub fn short_name(&self, max_len: usize) -> &str {
        match self.name.char_indices().nth(max_len) {
            Some((end, _)) => &self.name[..end],
            None => &self.name,
        }
    }

    pub fn range(&self) -> ParameterRange {
        self.range
    }

    /// Current normalized value in `[0, 1]`.
    pub fn value(&self) -> f32 {
        self.value.load()
    }

    pub fn plain_value(&self) -> f32 {
        self.range.from_normalized(self.value())
    }

    /// Normalized default.
    pub fn default_value(&self) -> f32 {
        self.range.to_normalized(self.range.default)
    }

    /// Take a value reported by the plugin. Returns true if it changed.
    pub fn update(&self, plain: f32, notify: bool) -> bool {
        let normalized = self.range.to_normalized(plain);
        if normalized == self.value.load() {
            return false;
        }
        self.value.store(normalized);
        if notify {
            self.notify_listeners(normalized);
        }
        true
    }

    /// Change the value and send it to the plugin port. The value only
    /// changes once the write has been queued.
    pub fn set_value(&self, normalized: f32) -> Result<()> {
        let plain = self.range.from_normalized(normalized);
        self.writer.write_float(self.port, plain)?;
        self.value.store(self.range.to_normalized(plain));
        Ok(())
    }

    /// Set from a plain value, e.g. when restoring state.
    pub fn set_plain_value(&self, plain: f32) -> Result<()> {
        self.set_value(self.range.to_normalized(plain))
    }

    pub fn text_for_value(&self, normalized: f32) -> String {
        format!("{:.2}", self.range.from_normalized(normalized))
    }

    /// Parse a plain value; unparsable text yields the default.
    pub fn value_for_text(&self, text: &str) -> f32 {
        match text.trim().parse::<f32>() {
            Ok(plain) => self.range.to_normalized(plain),
            Err(_) => self.default_value(),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn ParameterListener>) {
        self.listeners.lock().push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ParameterListener>) {
        self.listeners.lock().retain(|l| !Arc::ptr_eq(l, listener));
    }

    fn notify_listeners(&self, normalized: f32) {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener.value_changed(self.port, normalized);
        }
    }

    pub fn snapshot(&self) -> ParameterValue {
        ParameterValue {
            port_index: self.port,
            symbol: self.symbol.clone(),
            name: self.name.clone(),
            value: self.plain_value(),
            min: self.range.min,
            max: self.range.max,
            default: self.range.default,
        }
    }
}

impl std::fmt::Debug for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parameter")
            .field("port", &self.port)
            .field("symbol", &self.symbol)
            .field("value", &self.value)
            .finish()
    }
}

/// Parameters with a direct lookup table keyed by port index.
#[derive(Debug, Default)]
pub struct Parameters {
    list: Vec<Arc<Parameter>>,
    by_port: Vec<Option<usize>>,
}

impl Parameters {
    pub fn new(list: Vec<Arc<Parameter>>) -> Self {
        let span = list.iter().map(|p| p.port() as usize + 1).max().unwrap_or(0);
        let mut by_port = vec![None; span];
        for (i, p) in list.iter().enumerate() {
            by_port[p.port() as usize] = Some(i);
        }
        Self { list, by_port }
    }

    pub fn for_port(&self, port: u32) -> Option<&Arc<Parameter>> {
        let slot = (*self.by_port.get(port as usize)?)?;
        self.list.get(slot)
    }

    pub fn by_symbol(&self, symbol: &str) -> Option<&Arc<Parameter>> {
        self.list.iter().find(|p| p.symbol() == symbol)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Parameter>> {
        self.list.iter()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use ringbuf::traits::Consumer;

    use super::*;
    use crate::lv2::port_event::port_event_queue;
    use crate::lv2::PortType;

    fn gain_decl() -> PortDeclaration {
        PortDeclaration::new(3, PortType::Control, true, "gain")
            .with_name("Gain")
            .with_range(0.0, 2.0, 1.0)
    }

    #[derive(Default)]
    struct CountingListener {
        calls: AtomicU32,
    }

    impl ParameterListener for CountingListener {
        fn value_changed(&self, _port: u32, _normalized: f32) {
            self.calls.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_range_sanitizing() {
        let r = ParameterRange::new(f32::NAN, f32::NAN, f32::NAN);
        assert_eq!((r.min, r.max, r.default), (0.0, 1.0, 0.0));
        let r = ParameterRange::new(10.0, -10.0, 50.0);
        assert_eq!((r.min, r.max, r.default), (-10.0, 10.0, 10.0));
        let r = ParameterRange::new(1.0, 1.0, 1.0);
        assert_eq!(r.to_normalized(1.0), 0.0);
        assert_eq!(r.from_normalized(0.7), 1.0);
    }

    #[test]
    fn test_default_is_normalized() {
        let (tx, _rx) = port_event_queue(4);
        let p = Parameter::new(&gain_decl(), Arc::new(PortWriter::new(tx)));
        assert_eq!(p.default_value(), 0.5);
        assert_eq!(p.value(), 0.5);
        assert_eq!(p.plain_value(), 1.0);
    }

    #[test]
    fn test_set_value_writes_denormalized() {
        let (tx, mut rx) = port_event_queue(4);
        let p = Parameter::new(&gain_decl(), Arc::new(PortWriter::new(tx)));
        p.set_value(0.25).unwrap();

        let event = rx.try_pop().unwrap();
        assert_eq!(event.port, 3);
        assert_eq!(event.as_float(), Some(0.5));
        assert_eq!(p.value(), 0.25);
    }

    #[test]
    fn test_update_does_not_write_back() {
        let (tx, mut rx) = port_event_queue(4);
        let p = Parameter::new(&gain_decl(), Arc::new(PortWriter::new(tx)));
        assert!(p.update(1.5, true));
        assert_eq!(p.value(), 0.75);
        assert!(rx.try_pop().is_none());
        assert!(!p.update(1.5, true));
    }

    #[test]
    fn test_set_then_matching_update_keeps_value() {
        let (tx, _rx) = port_event_queue(4);
        let p = Parameter::new(&gain_decl(), Arc::new(PortWriter::new(tx)));
        for v in [0.0, 0.1, 0.333, 0.5, 0.9, 1.0] {
            p.set_value(v).unwrap_or(());
            p.update(p.range().from_normalized(v), true);
            assert!((p.value() - v).abs() < 1e-6, "{v}");
        }
    }

    #[test]
    fn test_listeners() {
        let (tx, _rx) = port_event_queue(4);
        let p = Parameter::new(&gain_decl(), Arc::new(PortWriter::new(tx)));
        let counter = Arc::new(CountingListener::default());
        let listener: Arc<dyn ParameterListener> = counter.clone();
        p.add_listener(listener.clone());

        p.update(0.0, true);
        p.update(0.0, true);
        p.update(2.0, false);
        assert_eq!(counter.calls.load(Ordering::Relaxed), 1);

        p.remove_listener(&listener);
        p.update(1.0, true);
        assert_eq!(counter.calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_text_conversion() {
        let (tx, _rx) = port_event_queue(4);
        let p = Parameter::new(&gain_decl(), Arc::new(PortWriter::new(tx)));
        assert_eq!(p.text_for_value(0.5), "1.00");
        assert_eq!(p.text_for_value(0.125), "0.25");
        assert_eq!(p.value_for_text("1.5"), 0.75);
        assert_eq!(p.value_for_text("loud"), 0.5);
        assert_eq!(p.short_name(2), "Ga");
        assert_eq!(p.short_name(20), "Gain");
    }

    #[test]
    fn test_lookup_table() {
        let (tx, _rx) = port_event_queue(4);
        let writer = Arc::new(PortWriter::new(tx));
        let a = PortDeclaration::new(1, PortType::Control, true, "a");
        let b = PortDeclaration::new(5, PortType::Control, true, "b");
        let params = Parameters::new(vec![
            Arc::new(Parameter::new(&a, writer.clone())),
            Arc::new(Parameter::new(&b, writer)),
        ]);
        assert_eq!(params.len(), 2);
        assert_eq!(params.for_port(5).map(|p| p.symbol()), Some("b"));
        assert!(params.for_port(0).is_none());
        assert!(params.for_port(99).is_none());
        assert_eq!(params.by_symbol("a").map(|p| p.port()), Some(1));
    }

    #[test]
    fn test_failed_write_keeps_value() {
        let (tx, _rx) = port_event_queue(1);
        let writer = Arc::new(PortWriter::new(tx));
        let p = Parameter::new(&gain_decl(), writer.clone());
        // fills the ring
        writer.write_float(9, 0.0).unwrap();

        assert!(matches!(p.set_value(0.75), Err(crate::Error::QueueFull)));
        assert_eq!(p.value(), 0.5);
        assert_eq!(p.plain_value(), 1.0);
    }
}
