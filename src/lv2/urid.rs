//! URID symbol map and the `urid:map` / `urid:unmap` features built on it.

use std::collections::HashMap;
use std::ffi::{CStr, CString, c_char, c_void};
use std::sync::Arc;

use lv2_raw::core::LV2Feature;
use lv2_raw::urid::{LV2Urid, LV2UridMap, LV2UridMapHandle};
use parking_lot::Mutex;

pub const LV2_URID_MAP_URI: &CStr = c"http://lv2plug.in/ns/ext/urid#map";
pub const LV2_URID_UNMAP_URI: &CStr = c"http://lv2plug.in/ns/ext/urid#unmap";

/// Bidirectional URI <-> integer table.
///
/// Ids start at 1 and are handed out sequentially; 0 means "not mapped".
/// Entries are never removed while the map is shared, so the C strings
/// returned through `urid:unmap` stay valid for the map's lifetime.
pub struct SymbolMap {
    inner: Mutex<SymbolMapInner>,
}

#[derive(Default)]
struct SymbolMapInner {
    uri_to_id: HashMap<String, LV2Urid>,
    /// `id_to_uri[id - 1]`
    id_to_uri: Vec<CString>,
}

impl SymbolMap {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SymbolMapInner::default()),
        }
    }

    /// The id for `uri`, allocating the next one if it is new. Returns 0 for
    /// strings that cannot be mapped (empty, or containing a NUL byte).
    pub fn map(&self, uri: &str) -> LV2Urid {
        if uri.is_empty() {
            return 0;
        }
        let mut inner = self.inner.lock();
        if let Some(&id) = inner.uri_to_id.get(uri) {
            return id;
        }
        let Ok(c_uri) = CString::new(uri) else {
            return 0;
        };
        inner.id_to_uri.push(c_uri);
        let id = inner.id_to_uri.len() as LV2Urid;
        inner.uri_to_id.insert(uri.to_string(), id);
        id
    }

    pub fn unmap(&self, urid: LV2Urid) -> Option<String> {
        let inner = self.inner.lock();
        Self::entry(&inner, urid).map(|s| s.to_string_lossy().into_owned())
    }

    pub fn contains_uri(&self, uri: &str) -> bool {
        self.inner.lock().uri_to_id.contains_key(uri)
    }

    pub fn contains_urid(&self, urid: LV2Urid) -> bool {
        let inner = self.inner.lock();
        Self::entry(&inner, urid).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().id_to_uri.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every mapping. Requires exclusive access, so no feature or
    /// plugin can still hold a pointer into the table.
    pub fn clear(&mut self) {
        let inner = self.inner.get_mut();
        inner.uri_to_id.clear();
        inner.id_to_uri.clear();
    }

    fn entry(inner: &SymbolMapInner, urid: LV2Urid) -> Option<&CString> {
        if urid == 0 {
            return None;
        }
        inner.id_to_uri.get(urid as usize - 1)
    }

    /// Pointer to the stored C string for `urid`, or null.
    fn unmap_ptr(&self, urid: LV2Urid) -> *const c_char {
        let inner = self.inner.lock();
        // The CString's heap buffer does not move when `id_to_uri` grows.
        Self::entry(&inner, urid).map_or(std::ptr::null(), |s| s.as_ptr())
    }
}

impl Default for SymbolMap {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// LV2 features
// ---------------------------------------------------------------------------

/// `LV2_URID_Unmap` from lv2/urid/urid.h (not provided by lv2_raw).
#[repr(C)]
pub struct LV2UridUnmap {
    pub handle: LV2UridMapHandle,
    pub unmap: extern "C" fn(handle: LV2UridMapHandle, urid: LV2Urid) -> *const c_char,
}

/// The `urid:map` and `urid:unmap` feature pair handed to one plugin
/// instance. Both carry the shared [`SymbolMap`] as their handle.
pub struct UridFeatures {
    symbols: Arc<SymbolMap>,
    _map: Box<LV2UridMap>,
    _unmap: Box<LV2UridUnmap>,
    map_feature: LV2Feature,
    unmap_feature: LV2Feature,
}

// SAFETY: the feature structs only point at the boxed tables above and at
// the SymbolMap kept alive by `symbols`, which is internally locked.
unsafe impl Send for UridFeatures {}

impl UridFeatures {
    pub fn new(symbols: Arc<SymbolMap>) -> Self {
        let handle = Arc::as_ptr(&symbols) as LV2UridMapHandle;
        let mut map = Box::new(LV2UridMap {
            handle,
            map: urid_map_callback,
        });
        let mut unmap = Box::new(LV2UridUnmap {
            handle,
            unmap: urid_unmap_callback,
        });
        let map_feature = LV2Feature {
            uri: LV2_URID_MAP_URI.as_ptr(),
            data: &mut *map as *mut LV2UridMap as *mut c_void,
        };
        let unmap_feature = LV2Feature {
            uri: LV2_URID_UNMAP_URI.as_ptr(),
            data: &mut *unmap as *mut LV2UridUnmap as *mut c_void,
        };
        Self {
            symbols,
            _map: map,
            _unmap: unmap,
            map_feature,
            unmap_feature,
        }
    }

    pub fn symbols(&self) -> &Arc<SymbolMap> {
        &self.symbols
    }

    pub fn map_feature(&self) -> &LV2Feature {
        &self.map_feature
    }

    pub fn unmap_feature(&self) -> &LV2Feature {
        &self.unmap_feature
    }
}

extern "C" fn urid_map_callback(handle: LV2UridMapHandle, uri: *const c_char) -> LV2Urid {
    if handle.is_null() || uri.is_null() {
        return 0;
    }
    let symbols = unsafe { &*(handle as *const SymbolMap) };
    let c_str = unsafe { CStr::from_ptr(uri) };
    match c_str.to_str() {
        Ok(s) => symbols.map(s),
        Err(_) => 0,
    }
}

extern "C" fn urid_unmap_callback(handle: LV2UridMapHandle, urid: LV2Urid) -> *const c_char {
    if handle.is_null() {
        return std::ptr::null();
    }
    let symbols = unsafe { &*(handle as *const SymbolMap) };
    symbols.unmap_ptr(urid)
}

// ---------------------------------------------------------------------------
// Cached URIDs
// ---------------------------------------------------------------------------

pub const LV2_ATOM_SEQUENCE: &str = "http://lv2plug.in/ns/ext/atom#Sequence";
pub const LV2_ATOM_CHUNK: &str = "http://lv2plug.in/ns/ext/atom#Chunk";
pub const LV2_ATOM_FLOAT: &str = "http://lv2plug.in/ns/ext/atom#Float";
pub const LV2_ATOM_EVENT_TRANSFER: &str = "http://lv2plug.in/ns/ext/atom#eventTransfer";
pub const LV2_MIDI_EVENT: &str = "http://lv2plug.in/ns/ext/midi#MidiEvent";

/// URIDs the audio thread needs, resolved once so `process()` never
/// touches the map's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uris {
    pub atom_sequence: LV2Urid,
    pub atom_chunk: LV2Urid,
    pub atom_float: LV2Urid,
    pub atom_event_transfer: LV2Urid,
    pub midi_event: LV2Urid,
}

impl Uris {
    pub fn new(symbols: &SymbolMap) -> Self {
        Self {
            atom_sequence: symbols.map(LV2_ATOM_SEQUENCE),
            atom_chunk: symbols.map(LV2_ATOM_CHUNK),
            atom_float: symbols.map(LV2_ATOM_FLOAT),
            atom_event_transfer: symbols.map(LV2_ATOM_EVENT_TRANSFER),
            midi_event: symbols.map(LV2_MIDI_EVENT),
        }
    }
}
