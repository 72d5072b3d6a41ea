//! DCAM Property Registry
//!
//! Discovers the vendor-defined property set of a device and mediates every
//! read and write to it.
//!
//! ## Discovery
//!
//! [`PropertyRegistry::refresh`] walks the supported property ids, fetching
//! the name and attribute record of each. A failed name fetch stops the walk
//! (the descriptors gathered so far are kept); a failed attribute fetch is
//! soft and still produces a descriptor without a kind.
//!
//! ## Access
//!
//! Values are never cached: every [`get`](PropertyRegistry::get) and
//! [`set`](PropertyRegistry::set) is a device round trip. The registry holds
//! descriptors only and borrows the [`DcamConnection`] for each call.
//!
//! ## Multi-write sequences
//!
//! [`PropertyRegistry::apply_writes`] attempts every write of an ordered list
//! even when an earlier one fails, then reports the failures together as
//! [`DcamError::PartialConfiguration`].

use std::collections::HashMap;
use std::fmt::{self, Write as _};

use tracing::{debug, info, warn};

use crate::api::{AttributeFlags, DcamApi, PropertyId, RawAttribute, UnitFlags};
use crate::components::connection::DcamConnection;
use crate::components::geometry::Roi;
use crate::components::modes::{ModeValue, SubarrayMode};
use crate::error::{DcamError, FailedWrite, Result};

// =============================================================================
// Descriptor model
// =============================================================================

/// Value type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// Integer.
    Long,
    /// Floating point.
    Real,
    /// Enumerated.
    Mode,
}

impl PropertyKind {
    /// Kind encoded in an attribute record.
    ///
    /// Devices occasionally report more than one type bit; the first match in
    /// Long, Real, Mode order wins.
    pub fn from_attributes(flags: AttributeFlags) -> Option<Self> {
        if flags.contains(AttributeFlags::TYPE_LONG) {
            Some(Self::Long)
        } else if flags.contains(AttributeFlags::TYPE_REAL) {
            Some(Self::Real)
        } else if flags.contains(AttributeFlags::TYPE_MODE) {
            Some(Self::Mode)
        } else {
            None
        }
    }

    /// Lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Real => "real",
            Self::Mode => "mode",
        }
    }
}

/// Physical unit of a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyUnit {
    /// Seconds.
    Second,
    /// Degrees Celsius.
    Celsius,
    /// Kelvin.
    Kelvin,
    /// Metres per second.
    MeterPerSecond,
    /// Per second.
    PerSecond,
    /// Angular degrees.
    Degree,
    /// Micrometres.
    Micrometer,
}

impl PropertyUnit {
    const PRIORITY: [(UnitFlags, PropertyUnit); 7] = [
        (UnitFlags::SECOND, Self::Second),
        (UnitFlags::CELSIUS, Self::Celsius),
        (UnitFlags::KELVIN, Self::Kelvin),
        (UnitFlags::METER_PER_SECOND, Self::MeterPerSecond),
        (UnitFlags::PER_SECOND, Self::PerSecond),
        (UnitFlags::DEGREE, Self::Degree),
        (UnitFlags::MICROMETER, Self::Micrometer),
    ];

    /// First unit bit present, if any.
    pub fn from_unit_flags(flags: UnitFlags) -> Option<Self> {
        Self::PRIORITY
            .iter()
            .find(|(bit, _)| flags.contains(*bit))
            .map(|(_, unit)| *unit)
    }

    /// Short unit symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Second => "s",
            Self::Celsius => "°C",
            Self::Kelvin => "K",
            Self::MeterPerSecond => "m/s",
            Self::PerSecond => "1/s",
            Self::Degree => "deg",
            Self::Micrometer => "µm",
        }
    }
}

/// Immutable description of one device property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    /// Device property id.
    pub id: PropertyId,
    /// Device-reported name.
    pub name: String,
    /// `None` when the device reported no type bit or the attributes were unavailable.
    pub kind: Option<PropertyKind>,
    /// Value can be read.
    pub readable: bool,
    /// Value can be written.
    pub writable: bool,
    /// Physical unit, if reported.
    pub unit: Option<PropertyUnit>,
    /// Lower bound.
    pub min_value: f64,
    /// Upper bound.
    pub max_value: f64,
    /// Increment between valid values.
    pub step_value: f64,
    /// Whether the device reported a step.
    pub has_step: bool,
    /// Factory default.
    pub default_value: f64,
}

impl PropertyDescriptor {
    /// Build a descriptor from an attribute record.
    ///
    /// `None` yields a descriptor with no kind, no access flags and a zero range.
    pub fn from_attribute(id: PropertyId, name: impl Into<String>, attr: Option<&RawAttribute>) -> Self {
        let name = name.into();
        match attr {
            Some(attr) => Self {
                id,
                name,
                kind: PropertyKind::from_attributes(attr.flags),
                readable: attr.flags.contains(AttributeFlags::READABLE),
                writable: attr.flags.contains(AttributeFlags::WRITABLE),
                unit: PropertyUnit::from_unit_flags(attr.unit),
                min_value: attr.min,
                max_value: attr.max,
                step_value: attr.step,
                has_step: attr.flags.contains(AttributeFlags::HAS_STEP),
                default_value: attr.default,
            },
            None => Self {
                id,
                name,
                kind: None,
                readable: false,
                writable: false,
                unit: None,
                min_value: 0.0,
                max_value: 0.0,
                step_value: 0.0,
                has_step: false,
                default_value: 0.0,
            },
        }
    }

    /// Whether `min <= default <= max` holds and a reported step is positive.
    pub fn is_consistent(&self) -> bool {
        self.min_value <= self.default_value
            && self.default_value <= self.max_value
            && (!self.has_step || self.step_value > 0.0)
    }

    /// Whether `value` lies within `[min, max]`.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min_value && value <= self.max_value
    }
}

impl fmt::Display for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind.map_or("untyped", |k| k.as_str());
        let access = match (self.readable, self.writable) {
            (true, true) => "rw",
            (true, false) => "r-",
            (false, true) => "-w",
            (false, false) => "--",
        };
        write!(
            f,
            "{} [{}] {} {} range {}..{} step {} default {}",
            self.name,
            self.id,
            kind,
            access,
            self.min_value,
            self.max_value,
            self.step_value,
            self.default_value
        )?;
        if let Some(unit) = self.unit {
            write!(f, " {}", unit.symbol())?;
        }
        Ok(())
    }
}

/// One entry of an ordered write sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertyWrite {
    /// Target property.
    pub property: PropertyId,
    /// Raw value to write.
    pub value: f64,
}

impl PropertyWrite {
    /// Build from parts.
    pub fn new(property: PropertyId, value: f64) -> Self {
        Self { property, value }
    }

    /// Write of a typed mode value to its property.
    pub fn mode<M: ModeValue>(mode: M) -> Self {
        Self::new(M::PROPERTY, mode.to_dcam())
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Name-keyed set of discovered property descriptors.
#[derive(Debug, Clone, Default)]
pub struct PropertyRegistry {
    descriptors: HashMap<String, PropertyDescriptor>,
}

impl PropertyRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor, replacing any earlier one with the same name.
    pub fn insert(&mut self, descriptor: PropertyDescriptor) {
        if let Some(previous) = self.descriptors.insert(descriptor.name.clone(), descriptor) {
            debug!(name = %previous.name, id = %previous.id, "Duplicate property name replaced");
        }
    }

    /// Rediscover every supported property of the device.
    ///
    /// Existing descriptors are discarded first.
    ///
    /// # Returns
    ///
    /// The number of descriptors in the registry.
    ///
    /// # Errors
    ///
    /// - [`DcamError::EnumerationAborted`] if the id walk or a name fetch
    ///   failed. Descriptors enumerated before the failure are kept.
    /// - [`DcamError::PartialDiscovery`] if enumeration completed but some
    ///   attribute records were unavailable. Those properties are present
    ///   without a kind.
    pub fn refresh<A: DcamApi>(&mut self, conn: &DcamConnection<A>) -> Result<usize> {
        self.descriptors.clear();
        let mut failed_ids = Vec::new();
        let mut cursor: Option<PropertyId> = None;

        loop {
            let next = conn
                .call("enumerate properties", |api, h| api.prop_next_id(h, cursor))
                .map_err(|e| self.aborted(e))?;
            let Some(id) = next else {
                break;
            };
            cursor = Some(id);

            let name = conn
                .call(&format!("read name of property {id}"), |api, h| api.prop_name(h, id))
                .map_err(|e| self.aborted(e))?;

            let attr = match conn.call(&format!("read attributes of {name}"), |api, h| {
                api.prop_attr(h, id)
            }) {
                Ok(attr) => Some(attr),
                Err(e) => {
                    warn!(property = %name, id = %id, error = %e, "Property attributes unavailable");
                    failed_ids.push(id);
                    None
                }
            };

            self.insert(PropertyDescriptor::from_attribute(id, name, attr.as_ref()));
        }

        info!(
            properties = self.descriptors.len(),
            soft_failures = failed_ids.len(),
            "Property discovery complete"
        );

        if failed_ids.is_empty() {
            Ok(self.descriptors.len())
        } else {
            Err(DcamError::PartialDiscovery { failed_ids })
        }
    }

    fn aborted(&self, source: DcamError) -> DcamError {
        warn!(enumerated = self.descriptors.len(), error = %source, "Property enumeration aborted");
        DcamError::EnumerationAborted {
            enumerated: self.descriptors.len(),
            source: Box::new(source),
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Descriptor for `name`, if discovered.
    pub fn descriptor(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.descriptors.get(name)
    }

    /// Look up a descriptor or fail with [`DcamError::UnknownProperty`].
    pub fn require(&self, name: &str) -> Result<&PropertyDescriptor> {
        self.descriptors
            .get(name)
            .ok_or_else(|| DcamError::UnknownProperty(name.to_string()))
    }

    /// All descriptors, sorted by name.
    pub fn descriptors(&self) -> Vec<&PropertyDescriptor> {
        let mut all: Vec<_> = self.descriptors.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Name of the property with this id, if discovered.
    pub fn name_of(&self, id: PropertyId) -> Option<&str> {
        self.descriptors
            .values()
            .find(|d| d.id == id)
            .map(|d| d.name.as_str())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Factory default of `name`.
    pub fn default_value(&self, name: &str) -> Result<f64> {
        Ok(self.require(name)?.default_value)
    }

    /// Lower bound of `name`.
    pub fn min_value(&self, name: &str) -> Result<f64> {
        Ok(self.require(name)?.min_value)
    }

    /// Upper bound of `name`.
    pub fn max_value(&self, name: &str) -> Result<f64> {
        Ok(self.require(name)?.max_value)
    }

    /// Step of `name`.
    pub fn step_value(&self, name: &str) -> Result<f64> {
        Ok(self.require(name)?.step_value)
    }

    /// Whether `name` can be written.
    pub fn is_writable(&self, name: &str) -> Result<bool> {
        Ok(self.require(name)?.writable)
    }

    /// Whether `name` can be read.
    pub fn is_readable(&self, name: &str) -> Result<bool> {
        Ok(self.require(name)?.readable)
    }

    /// Whether `name` is floating point.
    pub fn is_real(&self, name: &str) -> Result<bool> {
        Ok(self.require(name)?.kind == Some(PropertyKind::Real))
    }

    /// Whether `name` is an integer.
    pub fn is_long(&self, name: &str) -> Result<bool> {
        Ok(self.require(name)?.kind == Some(PropertyKind::Long))
    }

    /// Whether `name` is enumerated.
    pub fn is_mode(&self, name: &str) -> Result<bool> {
        Ok(self.require(name)?.kind == Some(PropertyKind::Mode))
    }

    /// One line per property, sorted by name. Each line is also logged at debug.
    pub fn describe_all(&self) -> String {
        let mut out = String::new();
        for descriptor in self.descriptors() {
            debug!("{descriptor}");
            let _ = writeln!(out, "{descriptor}");
        }
        out
    }

    // =========================================================================
    // Device access
    // =========================================================================

    fn label(&self, id: PropertyId) -> String {
        match self.name_of(id) {
            Some(name) => name.to_string(),
            None => id.to_string(),
        }
    }

    /// Read a property by name.
    pub fn get<A: DcamApi>(&self, conn: &DcamConnection<A>, name: &str) -> Result<f64> {
        let id = self.require(name)?.id;
        conn.call(&format!("get {name}"), |api, h| api.prop_value(h, id))
    }

    /// Write a property by name.
    pub fn set<A: DcamApi>(&self, conn: &DcamConnection<A>, name: &str, value: f64) -> Result<()> {
        let id = self.require(name)?.id;
        debug!(property = name, value, "Setting property");
        conn.call(&format!("set {name} to {value}"), |api, h| {
            api.prop_set_value(h, id, value)
        })
    }

    /// Read a property by id. Works before or without discovery.
    pub fn get_by_id<A: DcamApi>(&self, conn: &DcamConnection<A>, id: PropertyId) -> Result<f64> {
        conn.call(&format!("get {}", self.label(id)), |api, h| api.prop_value(h, id))
    }

    /// Write a property by id. Works before or without discovery.
    pub fn set_by_id<A: DcamApi>(
        &self,
        conn: &DcamConnection<A>,
        id: PropertyId,
        value: f64,
    ) -> Result<()> {
        let label = self.label(id);
        debug!(property = %label, value, "Setting property");
        conn.call(&format!("set {label} to {value}"), |api, h| {
            api.prop_set_value(h, id, value)
        })
    }

    /// Write and read back in one device call.
    ///
    /// The device may snap or clamp the request; the returned value is what
    /// it actually applied.
    pub fn set_and_get<A: DcamApi>(
        &self,
        conn: &DcamConnection<A>,
        id: PropertyId,
        value: f64,
    ) -> Result<f64> {
        let label = self.label(id);
        let applied = conn.call(&format!("set/get {label} to {value}"), |api, h| {
            api.prop_set_get_value(h, id, value)
        })?;
        if applied != value {
            debug!(property = %label, requested = value, applied, "Device adjusted value");
        }
        Ok(applied)
    }

    /// Write a typed mode value to its property.
    pub fn set_mode<A: DcamApi, M: ModeValue>(&self, conn: &DcamConnection<A>, mode: M) -> Result<()> {
        self.set_by_id(conn, M::PROPERTY, mode.to_dcam())
    }

    /// Read a mode property and decode it.
    ///
    /// # Errors
    ///
    /// [`DcamError::InvalidArgument`] if the device reports a value outside
    /// the known encodings.
    pub fn mode<A: DcamApi, M: ModeValue>(&self, conn: &DcamConnection<A>) -> Result<M> {
        let raw = self.get_by_id(conn, M::PROPERTY)?;
        M::from_dcam(raw).ok_or_else(|| {
            DcamError::InvalidArgument(format!(
                "unrecognised value {raw} for {}",
                self.label(M::PROPERTY)
            ))
        })
    }

    /// Exposure time in seconds.
    pub fn exposure<A: DcamApi>(&self, conn: &DcamConnection<A>) -> Result<f64> {
        self.get_by_id(conn, PropertyId::EXPOSURE_TIME)
    }

    /// Set the exposure time in seconds.
    pub fn set_exposure<A: DcamApi>(&self, conn: &DcamConnection<A>, seconds: f64) -> Result<()> {
        self.set_by_id(conn, PropertyId::EXPOSURE_TIME, seconds)
    }

    /// Set the exposure time and return the applied value.
    pub fn set_and_get_exposure<A: DcamApi>(&self, conn: &DcamConnection<A>, seconds: f64) -> Result<f64> {
        self.set_and_get(conn, PropertyId::EXPOSURE_TIME, seconds)
    }

    /// Apply an ordered list of writes.
    ///
    /// Every write is attempted. Failures are collected and reported once the
    /// list is exhausted, leaving the device in whatever state the successful
    /// writes produced.
    ///
    /// # Errors
    ///
    /// - [`DcamError::PartialConfiguration`] listing each failed write.
    /// - [`DcamError::DeviceClosed`] immediately if the handle is gone.
    pub fn apply_writes<A: DcamApi>(
        &self,
        conn: &DcamConnection<A>,
        operation: &'static str,
        writes: &[PropertyWrite],
    ) -> Result<()> {
        let mut failed = Vec::new();
        for write in writes {
            match self.set_by_id(conn, write.property, write.value) {
                Ok(()) => {}
                Err(DcamError::Device { code, .. }) => failed.push(FailedWrite {
                    property: write.property,
                    value: write.value,
                    code,
                }),
                Err(other) => return Err(other),
            }
        }

        if failed.is_empty() {
            debug!(operation, writes = writes.len(), "Configuration applied");
            Ok(())
        } else {
            warn!(
                operation,
                attempted = writes.len(),
                failed = failed.len(),
                "Configuration partially applied"
            );
            Err(DcamError::PartialConfiguration { operation, failed })
        }
    }

    /// Centre a `width` x `height` sub-array in a `sensor_size` square sensor
    /// and enable sub-array readout.
    ///
    /// Sizes are written as given; callers wanting 4-pixel alignment round
    /// first. Writes h-offset, v-offset, h-size, v-size, then sub-array mode.
    pub fn set_centered_roi_raw<A: DcamApi>(
        &self,
        conn: &DcamConnection<A>,
        width: u64,
        height: u64,
        sensor_size: u64,
    ) -> Result<Roi> {
        let roi = Roi::centered(width, height, sensor_size);
        let writes = [
            PropertyWrite::new(PropertyId::SUBARRAY_HPOS, roi.x_offset as f64),
            PropertyWrite::new(PropertyId::SUBARRAY_VPOS, roi.y_offset as f64),
            PropertyWrite::new(PropertyId::SUBARRAY_HSIZE, roi.width as f64),
            PropertyWrite::new(PropertyId::SUBARRAY_VSIZE, roi.height as f64),
            PropertyWrite::mode(SubarrayMode::On),
        ];
        self.apply_writes(conn, "centered ROI", &writes)?;
        Ok(roi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(flags: AttributeFlags) -> RawAttribute {
        RawAttribute {
            flags,
            unit: UnitFlags::empty(),
            min: 0.0,
            max: 10.0,
            step: 1.0,
            default: 5.0,
        }
    }

    #[test]
    fn test_kind_priority() {
        let both = AttributeFlags::TYPE_REAL | AttributeFlags::TYPE_LONG;
        assert_eq!(PropertyKind::from_attributes(both), Some(PropertyKind::Long));
        let real_mode = AttributeFlags::TYPE_REAL | AttributeFlags::TYPE_MODE;
        assert_eq!(PropertyKind::from_attributes(real_mode), Some(PropertyKind::Real));
        assert_eq!(
            PropertyKind::from_attributes(AttributeFlags::TYPE_MODE),
            Some(PropertyKind::Mode)
        );
        assert_eq!(PropertyKind::from_attributes(AttributeFlags::READABLE), None);
    }

    #[test]
    fn test_unit_first_bit_wins() {
        assert_eq!(PropertyUnit::from_unit_flags(UnitFlags::empty()), None);
        assert_eq!(
            PropertyUnit::from_unit_flags(UnitFlags::CELSIUS | UnitFlags::MICROMETER),
            Some(PropertyUnit::Celsius)
        );
    }

    #[test]
    fn test_descriptor_without_attributes() {
        let d = PropertyDescriptor::from_attribute(PropertyId(7), "MYSTERY", None);
        assert_eq!(d.kind, None);
        assert!(!d.readable && !d.writable);
        assert_eq!((d.min_value, d.max_value), (0.0, 0.0));
        assert!(d.is_consistent());
    }

    #[test]
    fn test_descriptor_consistency() {
        let mut d = PropertyDescriptor::from_attribute(
            PropertyId(1),
            "GAIN",
            Some(&attr(AttributeFlags::TYPE_LONG | AttributeFlags::READABLE)),
        );
        assert!(d.is_consistent());
        assert!(d.readable && !d.writable);
        d.default_value = 11.0;
        assert!(!d.is_consistent());
    }

    #[test]
    fn test_reported_step_must_be_positive() {
        let mut raw = attr(AttributeFlags::TYPE_REAL | AttributeFlags::HAS_STEP);
        raw.step = 0.0;
        let d = PropertyDescriptor::from_attribute(PropertyId(1), "OFFSET", Some(&raw));
        assert!(d.has_step);
        assert!(!d.is_consistent());

        // Without the step bit a zero step carries no meaning.
        let raw = RawAttribute {
            flags: AttributeFlags::TYPE_REAL,
            ..raw
        };
        let d = PropertyDescriptor::from_attribute(PropertyId(1), "OFFSET", Some(&raw));
        assert!(!d.has_step);
        assert!(d.is_consistent());
    }

    #[test]
    fn test_duplicate_name_overwrites() {
        let mut registry = PropertyRegistry::new();
        registry.insert(PropertyDescriptor::from_attribute(PropertyId(1), "X", None));
        registry.insert(PropertyDescriptor::from_attribute(PropertyId(2), "X", None));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.descriptor("X").map(|d| d.id), Some(PropertyId(2)));
    }

    #[test]
    fn test_unknown_name() {
        let registry = PropertyRegistry::new();
        assert!(matches!(
            registry.default_value("NOPE"),
            Err(DcamError::UnknownProperty(name)) if name == "NOPE"
        ));
    }

    #[test]
    fn test_descriptors_sorted() {
        let mut registry = PropertyRegistry::new();
        for (id, name) in [(3, "C"), (1, "A"), (2, "B")] {
            registry.insert(PropertyDescriptor::from_attribute(PropertyId(id), name, None));
        }
        let names: Vec<_> = registry.descriptors().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
        assert_eq!(registry.describe_all().lines().count(), 3);
    }

    #[cfg(feature = "mock")]
    mod device {
        use super::*;
        use crate::error::DcamErrorCode;
        use crate::mock::{MockDcam, MockProperty};

        fn discovered(mock: &MockDcam) -> (DcamConnection<MockDcam>, PropertyRegistry) {
            let conn = DcamConnection::open(mock.clone(), 0, 32).unwrap();
            let mut registry = PropertyRegistry::new();
            registry.refresh(&conn).unwrap();
            (conn, registry)
        }

        #[test]
        fn test_set_and_get_is_idempotent() {
            let mock = MockDcam::standard();
            let (conn, registry) = discovered(&mock);
            let first = registry.set_and_get(&conn, PropertyId::SUBARRAY_HSIZE, 1001.0).unwrap();
            let second = registry.set_and_get(&conn, PropertyId::SUBARRAY_HSIZE, first).unwrap();
            assert_eq!(first, 1000.0);
            assert_eq!(first, second);
        }

        #[test]
        fn test_attr_failure_is_soft() {
            let mock = MockDcam::new()
                .with_property(MockProperty::real(PropertyId(1), "A", 0.0, 1.0, 0.1, 0.5))
                .with_property(MockProperty::real(PropertyId(2), "B", 0.0, 1.0, 0.1, 0.5));
            mock.fail_attr(PropertyId(1), DcamErrorCode::NOT_SUPPORTED);
            let conn = DcamConnection::open(mock.clone(), 0, 32).unwrap();
            let mut registry = PropertyRegistry::new();

            let err = registry.refresh(&conn).unwrap_err();
            assert!(matches!(
                &err,
                DcamError::PartialDiscovery { failed_ids } if failed_ids == &[PropertyId(1)]
            ));
            assert_eq!(registry.len(), 2);
            assert_eq!(registry.descriptor("A").unwrap().kind, None);
            assert_eq!(registry.descriptor("B").unwrap().kind, Some(PropertyKind::Real));
            assert_eq!(conn.error_log().len(), 1);
        }

        #[test]
        fn test_apply_writes_attempts_everything() {
            let mock = MockDcam::standard();
            let (conn, registry) = discovered(&mock);
            mock.fail_set(PropertyId::SUBARRAY_VPOS, DcamErrorCode::BUSY);
            mock.clear_writes();

            let err = registry
                .set_centered_roi_raw(&conn, 1000, 800, 2048)
                .unwrap_err();
            let DcamError::PartialConfiguration { operation, failed } = err else {
                panic!("expected partial configuration");
            };
            assert_eq!(operation, "centered ROI");
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].property, PropertyId::SUBARRAY_VPOS);
            assert_eq!(mock.writes().len(), 5);
            assert_eq!(mock.value(PropertyId::SUBARRAY_MODE), Some(2.0));
        }
    }
}
