//! Simulated DCAM device.
//!
//! [`MockDcam`] implements [`DcamApi`] entirely in memory so the registry,
//! controller and frame-transfer paths can be exercised without hardware.
//! Clones share state, so a test can hand one clone to a
//! [`CaptureController`](crate::components::acquisition::CaptureController)
//! and keep another to inject failures and inspect the write history.
//!
//! Behaviour:
//! - writes snap to the property step and are rejected when outside the range
//! - every attempted write is appended to [`MockDcam::writes`], including
//!   the ones that fail
//! - while capturing, each wait produces one frame unless the trigger source
//!   is software, in which case a fired trigger is consumed first
//! - snap captures stop on their own once the ring has been filled

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::api::{
    ApiResult, AttributeFlags, CaptureMode, CaptureStatus, DcamApi, DeviceHandle, DeviceString,
    PropertyId, RawAttribute, TransferInfo, UnitFlags,
};
use crate::error::DcamErrorCode;

/// Default number of frames in the simulated device ring.
pub const DEFAULT_RING_SIZE: u32 = 16;

/// Trigger source value that makes frames wait for a fired trigger.
const SOFTWARE_TRIGGER_SOURCE: f64 = 3.0;

/// One simulated property.
#[derive(Debug, Clone)]
pub struct MockProperty {
    /// Property id.
    pub id: PropertyId,
    /// Property name.
    pub name: String,
    /// Attribute record.
    pub attr: RawAttribute,
    /// Current value.
    pub value: f64,
}

impl MockProperty {
    fn with_type(
        id: PropertyId,
        name: &str,
        type_flag: AttributeFlags,
        min: f64,
        max: f64,
        step: f64,
        default: f64,
    ) -> Self {
        let flags = type_flag
            | AttributeFlags::READABLE
            | AttributeFlags::WRITABLE
            | AttributeFlags::HAS_RANGE
            | AttributeFlags::HAS_STEP
            | AttributeFlags::HAS_DEFAULT;
        Self {
            id,
            name: name.to_string(),
            attr: RawAttribute {
                flags,
                unit: UnitFlags::empty(),
                min,
                max,
                step,
                default,
            },
            value: default,
        }
    }

    /// Floating-point property.
    pub fn real(id: PropertyId, name: &str, min: f64, max: f64, step: f64, default: f64) -> Self {
        Self::with_type(id, name, AttributeFlags::TYPE_REAL, min, max, step, default)
    }

    /// Integer property.
    pub fn long(id: PropertyId, name: &str, min: f64, max: f64, step: f64, default: f64) -> Self {
        Self::with_type(id, name, AttributeFlags::TYPE_LONG, min, max, step, default)
    }

    /// Enumerated property with values `min..=max`.
    pub fn mode(id: PropertyId, name: &str, min: f64, max: f64, default: f64) -> Self {
        Self::with_type(id, name, AttributeFlags::TYPE_MODE, min, max, 1.0, default)
    }

    /// Clear the writable bit.
    pub fn read_only(mut self) -> Self {
        self.attr.flags.remove(AttributeFlags::WRITABLE);
        self
    }

    /// Replace the attribute flags wholesale.
    pub fn with_flags(mut self, flags: AttributeFlags) -> Self {
        self.attr.flags = flags;
        self
    }

    /// Set the unit bits.
    pub fn with_unit(mut self, unit: UnitFlags) -> Self {
        self.attr.unit = unit;
        self
    }

    fn has(&self, flag: AttributeFlags) -> bool {
        self.attr.flags.contains(flag)
    }

    /// Value the device would store for a request, or the rejection code.
    fn accept(&self, requested: f64) -> ApiResult<f64> {
        if !self.has(AttributeFlags::WRITABLE) {
            return Err(DcamErrorCode::NOT_WRITABLE);
        }
        if !requested.is_finite() {
            return Err(DcamErrorCode::INVALID_VALUE);
        }
        let attr = &self.attr;
        if self.has(AttributeFlags::HAS_RANGE) && (requested < attr.min || requested > attr.max) {
            return Err(DcamErrorCode::OUT_OF_RANGE);
        }
        let mut value = requested;
        if self.has(AttributeFlags::HAS_STEP) && attr.step > 0.0 {
            value = attr.min + ((requested - attr.min) / attr.step).round() * attr.step;
            if self.has(AttributeFlags::HAS_RANGE) {
                value = value.clamp(attr.min, attr.max);
            }
        }
        Ok(value)
    }
}

#[derive(Debug)]
struct MockState {
    device_count: u32,
    next_handle: u64,
    open_handles: HashSet<u64>,
    close_calls: u32,
    strings: HashMap<&'static str, String>,
    properties: BTreeMap<PropertyId, MockProperty>,
    writes: Vec<(PropertyId, f64)>,

    fail_open: Option<DcamErrorCode>,
    fail_name: HashMap<PropertyId, DcamErrorCode>,
    fail_attr: HashMap<PropertyId, DcamErrorCode>,
    fail_set: HashMap<PropertyId, DcamErrorCode>,
    fail_string: HashMap<&'static str, DcamErrorCode>,
    fail_status: Option<DcamErrorCode>,
    fail_start: Option<DcamErrorCode>,

    ring_size: u32,
    frames_per_wait: u32,
    capture: Option<CaptureMode>,
    frame_count: u32,
    pending_triggers: u32,
    fired_triggers: u32,
}

impl Default for MockState {
    fn default() -> Self {
        let strings = [
            (DeviceString::Vendor, "HAMAMATSU"),
            (DeviceString::Model, "C13440-20CU"),
            (DeviceString::CameraId, "S/N: 000001"),
            (DeviceString::Bus, "USB3.0"),
            (DeviceString::CameraVersion, "2.00.A"),
            (DeviceString::DriverVersion, "5.1.6"),
            (DeviceString::ModuleVersion, "24.1.6669"),
            (DeviceString::ApiVersion, "4.00"),
        ]
        .into_iter()
        .map(|(which, value)| (which.as_str(), value.to_string()))
        .collect();

        Self {
            device_count: 1,
            next_handle: 1,
            open_handles: HashSet::new(),
            close_calls: 0,
            strings,
            properties: BTreeMap::new(),
            writes: Vec::new(),
            fail_open: None,
            fail_name: HashMap::new(),
            fail_attr: HashMap::new(),
            fail_set: HashMap::new(),
            fail_string: HashMap::new(),
            fail_status: None,
            fail_start: None,
            ring_size: DEFAULT_RING_SIZE,
            frames_per_wait: 1,
            capture: None,
            frame_count: 0,
            pending_triggers: 0,
            fired_triggers: 0,
        }
    }
}

impl MockState {
    fn check_handle(&self, handle: DeviceHandle) -> ApiResult<()> {
        if self.open_handles.contains(&handle.0) {
            Ok(())
        } else {
            Err(DcamErrorCode::INVALID_HANDLE)
        }
    }

    fn property(&self, id: PropertyId) -> ApiResult<&MockProperty> {
        self.properties
            .get(&id)
            .ok_or(DcamErrorCode::INVALID_PROPERTY_ID)
    }

    fn write(&mut self, id: PropertyId, requested: f64) -> ApiResult<f64> {
        self.writes.push((id, requested));
        if let Some(code) = self.fail_set.get(&id) {
            return Err(*code);
        }
        let prop = self
            .properties
            .get_mut(&id)
            .ok_or(DcamErrorCode::INVALID_PROPERTY_ID)?;
        let value = prop.accept(requested)?;
        prop.value = value;
        Ok(value)
    }

    fn software_triggered(&self) -> bool {
        self.properties
            .get(&PropertyId::TRIGGER_SOURCE)
            .is_some_and(|p| p.value == SOFTWARE_TRIGGER_SOURCE)
    }

    fn newest_frame_index(&self) -> i32 {
        if self.frame_count == 0 {
            -1
        } else {
            ((self.frame_count - 1) % self.ring_size) as i32
        }
    }
}

/// In-memory DCAM device.
#[derive(Debug, Clone, Default)]
pub struct MockDcam {
    state: Arc<Mutex<MockState>>,
}

impl MockDcam {
    /// A device with no properties.
    pub fn new() -> Self {
        Self::default()
    }

    /// A device exposing the well-known properties of a 2048x2048 sCMOS sensor.
    pub fn standard() -> Self {
        let sensor = 2048.0;
        Self::new()
            .with_property(
                MockProperty::real(PropertyId::EXPOSURE_TIME, "EXPOSURE TIME", 0.000_1, 10.0, 0.000_001, 0.01)
                    .with_unit(UnitFlags::SECOND),
            )
            .with_property(MockProperty::mode(PropertyId::TRIGGER_SOURCE, "TRIGGER SOURCE", 1.0, 4.0, 1.0))
            .with_property(MockProperty::mode(PropertyId::TRIGGER_ACTIVE, "TRIGGER ACTIVE", 1.0, 3.0, 1.0))
            .with_property(MockProperty::mode(PropertyId::TRIGGER_MODE, "TRIGGER MODE", 1.0, 6.0, 1.0))
            .with_property(MockProperty::mode(PropertyId::TRIGGER_POLARITY, "TRIGGER POLARITY", 1.0, 2.0, 1.0))
            .with_property(MockProperty::mode(PropertyId::TRIGGER_CONNECTOR, "TRIGGER CONNECTOR", 1.0, 2.0, 2.0))
            .with_property(MockProperty::long(PropertyId::TRIGGER_TIMES, "TRIGGER TIMES", 1.0, 10_000.0, 1.0, 1.0))
            .with_property(
                MockProperty::real(PropertyId::TRIGGER_DELAY, "TRIGGER DELAY", 0.0, 10.0, 0.000_001, 0.0)
                    .with_unit(UnitFlags::SECOND),
            )
            .with_property(MockProperty::mode(
                PropertyId::OUTPUT_TRIGGER_POLARITY,
                "OUTPUT TRIGGER POLARITY",
                1.0,
                2.0,
                1.0,
            ))
            .with_property(MockProperty::mode(
                PropertyId::OUTPUT_TRIGGER_KIND,
                "OUTPUT TRIGGER KIND",
                1.0,
                5.0,
                1.0,
            ))
            .with_property(MockProperty::mode(PropertyId::BINNING, "BINNING", 1.0, 4.0, 1.0))
            .with_property(MockProperty::long(PropertyId::SUBARRAY_HPOS, "SUBARRAY HPOS", 0.0, sensor - 4.0, 4.0, 0.0))
            .with_property(MockProperty::long(PropertyId::SUBARRAY_HSIZE, "SUBARRAY HSIZE", 4.0, sensor, 4.0, sensor))
            .with_property(MockProperty::long(PropertyId::SUBARRAY_VPOS, "SUBARRAY VPOS", 0.0, sensor - 4.0, 4.0, 0.0))
            .with_property(MockProperty::long(PropertyId::SUBARRAY_VSIZE, "SUBARRAY VSIZE", 4.0, sensor, 4.0, sensor))
            .with_property(MockProperty::mode(PropertyId::SUBARRAY_MODE, "SUBARRAY MODE", 1.0, 2.0, 1.0))
            .with_property(MockProperty::mode(
                PropertyId::DEFECT_CORRECT_MODE,
                "DEFECT CORRECT MODE",
                1.0,
                2.0,
                2.0,
            ))
            .with_property(
                MockProperty::real(PropertyId(0x0020_0310), "SENSOR TEMPERATURE", -60.0, 60.0, 0.1, -20.0)
                    .with_unit(UnitFlags::CELSIUS)
                    .read_only(),
            )
    }

    // =========================================================================
    // Builder
    // =========================================================================

    /// Add a property (replacing any with the same id).
    pub fn with_property(self, property: MockProperty) -> Self {
        self.state.lock().properties.insert(property.id, property);
        self
    }

    /// Number of devices reachable through `open_device`.
    pub fn with_device_count(self, count: u32) -> Self {
        self.state.lock().device_count = count;
        self
    }

    /// Frames in the simulated ring (minimum 1).
    pub fn with_ring_size(self, frames: u32) -> Self {
        self.state.lock().ring_size = frames.max(1);
        self
    }

    /// Frames that land in the ring during each wait (minimum 1). Software
    /// triggered captures still need one trigger per frame.
    pub fn with_frames_per_wait(self, frames: u32) -> Self {
        self.state.lock().frames_per_wait = frames.max(1);
        self
    }

    // =========================================================================
    // Failure injection
    // =========================================================================

    /// Make every open fail with `code`.
    pub fn fail_open(&self, code: DcamErrorCode) {
        self.state.lock().fail_open = Some(code);
    }

    /// Make name lookup of `id` fail.
    pub fn fail_name(&self, id: PropertyId, code: DcamErrorCode) {
        self.state.lock().fail_name.insert(id, code);
    }

    /// Make attribute lookup of `id` fail.
    pub fn fail_attr(&self, id: PropertyId, code: DcamErrorCode) {
        self.state.lock().fail_attr.insert(id, code);
    }

    /// Make writes to `id` fail.
    pub fn fail_set(&self, id: PropertyId, code: DcamErrorCode) {
        self.state.lock().fail_set.insert(id, code);
    }

    /// Make one identification string fail.
    pub fn fail_device_string(&self, which: DeviceString, code: DcamErrorCode) {
        self.state.lock().fail_string.insert(which.as_str(), code);
    }

    /// Make status polls fail.
    pub fn fail_status(&self, code: DcamErrorCode) {
        self.state.lock().fail_status = Some(code);
    }

    /// Make capture start fail.
    pub fn fail_start(&self, code: DcamErrorCode) {
        self.state.lock().fail_start = Some(code);
    }

    /// Remove every injected failure.
    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.fail_open = None;
        state.fail_name.clear();
        state.fail_attr.clear();
        state.fail_set.clear();
        state.fail_string.clear();
        state.fail_status = None;
        state.fail_start = None;
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Every attempted write, in order, with the requested value.
    pub fn writes(&self) -> Vec<(PropertyId, f64)> {
        self.state.lock().writes.clone()
    }

    /// Forget the write history.
    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    /// Stored value of a property.
    pub fn value(&self, id: PropertyId) -> Option<f64> {
        self.state.lock().properties.get(&id).map(|p| p.value)
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.state.lock().open_handles.len()
    }

    /// Number of successful `close_device` calls.
    pub fn close_calls(&self) -> u32 {
        self.state.lock().close_calls
    }

    /// Whether a capture is running.
    pub fn is_capturing(&self) -> bool {
        self.state.lock().capture.is_some()
    }

    /// Number of software triggers fired since creation.
    pub fn fired_triggers(&self) -> u32 {
        self.state.lock().fired_triggers
    }

    /// Byte the simulated sensor writes at `offset` of frame `frame_index`.
    pub fn frame_byte(frame_index: i32, offset: usize) -> u8 {
        (frame_index as u8).wrapping_mul(31).wrapping_add(offset as u8)
    }
}

impl DcamApi for MockDcam {
    fn open_device(&self, index: u32) -> ApiResult<DeviceHandle> {
        let mut state = self.state.lock();
        if let Some(code) = state.fail_open {
            return Err(code);
        }
        if index >= state.device_count {
            return Err(DcamErrorCode::NO_CAMERA);
        }
        let handle = state.next_handle;
        state.next_handle += 1;
        state.open_handles.insert(handle);
        Ok(DeviceHandle(handle))
    }

    fn close_device(&self, handle: DeviceHandle) -> ApiResult<()> {
        let mut state = self.state.lock();
        if !state.open_handles.remove(&handle.0) {
            return Err(DcamErrorCode::INVALID_HANDLE);
        }
        state.close_calls += 1;
        state.capture = None;
        Ok(())
    }

    fn device_string(&self, handle: DeviceHandle, which: DeviceString) -> ApiResult<String> {
        let state = self.state.lock();
        state.check_handle(handle)?;
        if let Some(code) = state.fail_string.get(which.as_str()) {
            return Err(*code);
        }
        state
            .strings
            .get(which.as_str())
            .cloned()
            .ok_or(DcamErrorCode::NOT_SUPPORTED)
    }

    fn prop_next_id(
        &self,
        handle: DeviceHandle,
        after: Option<PropertyId>,
    ) -> ApiResult<Option<PropertyId>> {
        let state = self.state.lock();
        state.check_handle(handle)?;
        let next = match after {
            None => state.properties.keys().next(),
            Some(after) => state
                .properties
                .range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded))
                .map(|(id, _)| id)
                .next(),
        };
        Ok(next.copied())
    }

    fn prop_name(&self, handle: DeviceHandle, id: PropertyId) -> ApiResult<String> {
        let state = self.state.lock();
        state.check_handle(handle)?;
        if let Some(code) = state.fail_name.get(&id) {
            return Err(*code);
        }
        Ok(state.property(id)?.name.clone())
    }

    fn prop_attr(&self, handle: DeviceHandle, id: PropertyId) -> ApiResult<RawAttribute> {
        let state = self.state.lock();
        state.check_handle(handle)?;
        if let Some(code) = state.fail_attr.get(&id) {
            return Err(*code);
        }
        Ok(state.property(id)?.attr)
    }

    fn prop_value(&self, handle: DeviceHandle, id: PropertyId) -> ApiResult<f64> {
        let state = self.state.lock();
        state.check_handle(handle)?;
        let prop = state.property(id)?;
        if !prop.has(AttributeFlags::READABLE) {
            return Err(DcamErrorCode::NOT_READABLE);
        }
        Ok(prop.value)
    }

    fn prop_set_value(&self, handle: DeviceHandle, id: PropertyId, value: f64) -> ApiResult<()> {
        let mut state = self.state.lock();
        state.check_handle(handle)?;
        state.write(id, value).map(|_| ())
    }

    fn prop_set_get_value(
        &self,
        handle: DeviceHandle,
        id: PropertyId,
        value: f64,
    ) -> ApiResult<f64> {
        let mut state = self.state.lock();
        state.check_handle(handle)?;
        state.write(id, value)
    }

    fn cap_start(&self, handle: DeviceHandle, mode: CaptureMode) -> ApiResult<()> {
        let mut state = self.state.lock();
        state.check_handle(handle)?;
        if let Some(code) = state.fail_start {
            return Err(code);
        }
        if state.capture.is_some() {
            return Err(DcamErrorCode::BUSY);
        }
        state.capture = Some(mode);
        state.frame_count = 0;
        state.pending_triggers = 0;
        Ok(())
    }

    fn cap_stop(&self, handle: DeviceHandle) -> ApiResult<()> {
        let mut state = self.state.lock();
        state.check_handle(handle)?;
        state.capture = None;
        state.pending_triggers = 0;
        Ok(())
    }

    fn cap_status(&self, handle: DeviceHandle) -> ApiResult<CaptureStatus> {
        let state = self.state.lock();
        state.check_handle(handle)?;
        if let Some(code) = state.fail_status {
            return Err(code);
        }
        Ok(if state.capture.is_some() {
            CaptureStatus::Busy
        } else {
            CaptureStatus::Ready
        })
    }

    fn cap_transfer_info(&self, handle: DeviceHandle) -> ApiResult<TransferInfo> {
        let state = self.state.lock();
        state.check_handle(handle)?;
        Ok(TransferInfo {
            frame_count: state.frame_count,
            newest_frame_index: state.newest_frame_index(),
        })
    }

    fn cap_fire_trigger(&self, handle: DeviceHandle) -> ApiResult<()> {
        let mut state = self.state.lock();
        state.check_handle(handle)?;
        if state.capture.is_none() {
            return Err(DcamErrorCode::NOT_READY);
        }
        state.pending_triggers += 1;
        state.fired_triggers += 1;
        Ok(())
    }

    fn wait_frame_ready(&self, handle: DeviceHandle, _timeout: Duration) -> ApiResult<()> {
        let mut state = self.state.lock();
        state.check_handle(handle)?;
        let Some(mode) = state.capture else {
            return Err(DcamErrorCode::ABORT);
        };
        let mut arrived = state.frames_per_wait;
        if state.software_triggered() {
            arrived = arrived.min(state.pending_triggers);
            if arrived == 0 {
                return Err(DcamErrorCode::TIMEOUT);
            }
            state.pending_triggers -= arrived;
        }
        state.frame_count += arrived;
        if mode == CaptureMode::Snap && state.frame_count >= state.ring_size {
            state.frame_count = state.ring_size;
            state.capture = None;
        }
        Ok(())
    }

    fn copy_frame(
        &self,
        handle: DeviceHandle,
        frame_index: i32,
        dest: &mut [u8],
    ) -> ApiResult<usize> {
        let state = self.state.lock();
        state.check_handle(handle)?;
        let delivered = state.frame_count.min(state.ring_size);
        if frame_index < 0 || frame_index as u32 >= delivered {
            return Err(DcamErrorCode::INVALID_PARAM);
        }
        for (offset, byte) in dest.iter_mut().enumerate() {
            *byte = Self::frame_byte(frame_index, offset);
        }
        Ok(dest.len())
    }

    fn adjust_width_height(&self, _handle: DeviceHandle, value: u64, granularity: u64) -> u64 {
        let granularity = granularity.max(1);
        let snapped = (value + granularity / 2) / granularity * granularity;
        snapped.max(granularity)
    }
}
