//! Trigger presets.
//!
//! A preset is a named, ordered list of mode-property writes. Presets are not
//! atomic: they are applied through
//! [`PropertyRegistry::apply_writes`](crate::components::properties::PropertyRegistry::apply_writes),
//! which attempts every write and reports the failures together.

use std::fmt;

use crate::api::PropertyId;
use crate::components::modes::{
    OutputTriggerKind, OutputTriggerPolarity, TriggerActive, TriggerConnector, TriggerMode,
    TriggerPolarity, TriggerSource,
};
use crate::components::properties::PropertyWrite;

/// Named trigger configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerPreset {
    /// Normal mode, positive polarity, BNC connector, one trigger, no delay.
    InputDefaults,
    /// External trigger on the rising edge.
    ExternalEdge,
    /// External trigger gating the exposure for as long as it is high.
    ExternalLevel,
    /// External edge trigger synchronised to readout.
    ExternalFastEdge,
    /// Free-running on the internal clock.
    Internal,
    /// Exposures started by software triggers.
    Software,
    /// Output line high during exposure.
    OutputToExposure,
    /// Output line driven by the programmable timing generator.
    OutputToProgrammable,
}

impl TriggerPreset {
    /// Every preset.
    pub const ALL: [TriggerPreset; 8] = [
        Self::InputDefaults,
        Self::ExternalEdge,
        Self::ExternalLevel,
        Self::ExternalFastEdge,
        Self::Internal,
        Self::Software,
        Self::OutputToExposure,
        Self::OutputToProgrammable,
    ];

    /// Lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InputDefaults => "input defaults",
            Self::ExternalEdge => "external edge trigger",
            Self::ExternalLevel => "external level trigger",
            Self::ExternalFastEdge => "external fast edge trigger",
            Self::Internal => "internal trigger",
            Self::Software => "software trigger",
            Self::OutputToExposure => "output trigger to exposure",
            Self::OutputToProgrammable => "output trigger to programmable",
        }
    }

    /// Trigger source this preset selects, if it writes one.
    pub fn source(&self) -> Option<TriggerSource> {
        match self {
            Self::ExternalEdge | Self::ExternalLevel | Self::ExternalFastEdge => {
                Some(TriggerSource::External)
            }
            Self::Internal => Some(TriggerSource::Internal),
            Self::Software => Some(TriggerSource::Software),
            Self::InputDefaults | Self::OutputToExposure | Self::OutputToProgrammable => None,
        }
    }

    /// The writes this preset performs, in order.
    pub fn writes(&self) -> Vec<PropertyWrite> {
        let mut writes = Vec::new();
        self.extend(&mut writes);
        writes
    }

    fn extend(&self, writes: &mut Vec<PropertyWrite>) {
        match self {
            Self::InputDefaults => {
                writes.push(PropertyWrite::mode(TriggerMode::Normal));
                writes.push(PropertyWrite::mode(TriggerPolarity::Positive));
                writes.push(PropertyWrite::mode(TriggerConnector::Bnc));
                writes.push(PropertyWrite::new(PropertyId::TRIGGER_TIMES, 1.0));
                writes.push(PropertyWrite::new(PropertyId::TRIGGER_DELAY, 0.0));
            }
            Self::ExternalEdge | Self::ExternalLevel | Self::ExternalFastEdge => {
                let active = match self {
                    Self::ExternalLevel => TriggerActive::Level,
                    Self::ExternalFastEdge => TriggerActive::SyncReadout,
                    _ => TriggerActive::Edge,
                };
                Self::InputDefaults.extend(writes);
                writes.push(PropertyWrite::mode(TriggerSource::External));
                writes.push(PropertyWrite::mode(active));
                Self::OutputToExposure.extend(writes);
            }
            Self::Internal => writes.push(PropertyWrite::mode(TriggerSource::Internal)),
            Self::Software => writes.push(PropertyWrite::mode(TriggerSource::Software)),
            Self::OutputToExposure | Self::OutputToProgrammable => {
                let kind = if *self == Self::OutputToExposure {
                    OutputTriggerKind::Exposure
                } else {
                    OutputTriggerKind::Programmable
                };
                // The output trigger shares the connector property with the input.
                writes.push(PropertyWrite::mode(TriggerConnector::Bnc));
                writes.push(PropertyWrite::mode(OutputTriggerPolarity::Positive));
                writes.push(PropertyWrite::mode(kind));
            }
        }
    }
}

impl fmt::Display for TriggerPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(preset: TriggerPreset) -> Vec<PropertyId> {
        preset.writes().iter().map(|w| w.property).collect()
    }

    #[test]
    fn test_input_defaults() {
        let writes = TriggerPreset::InputDefaults.writes();
        let expected = [
            (PropertyId::TRIGGER_MODE, 1.0),
            (PropertyId::TRIGGER_POLARITY, 2.0),
            (PropertyId::TRIGGER_CONNECTOR, 2.0),
            (PropertyId::TRIGGER_TIMES, 1.0),
            (PropertyId::TRIGGER_DELAY, 0.0),
        ];
        let actual: Vec<_> = writes.iter().map(|w| (w.property, w.value)).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_external_presets_compose() {
        for (preset, active) in [
            (TriggerPreset::ExternalEdge, 1.0),
            (TriggerPreset::ExternalLevel, 2.0),
            (TriggerPreset::ExternalFastEdge, 3.0),
        ] {
            let writes = preset.writes();
            assert_eq!(writes.len(), 5 + 2 + 3, "{preset}");
            assert_eq!(writes[5], PropertyWrite::new(PropertyId::TRIGGER_SOURCE, 2.0));
            assert_eq!(writes[6], PropertyWrite::new(PropertyId::TRIGGER_ACTIVE, active));
            assert_eq!(
                writes[9],
                PropertyWrite::new(PropertyId::OUTPUT_TRIGGER_KIND, 2.0)
            );
        }
    }

    #[test]
    fn test_single_source_presets() {
        assert_eq!(ids(TriggerPreset::Internal), [PropertyId::TRIGGER_SOURCE]);
        assert_eq!(
            TriggerPreset::Software.writes(),
            [PropertyWrite::new(PropertyId::TRIGGER_SOURCE, 3.0)]
        );
    }

    #[test]
    fn test_output_presets() {
        assert_eq!(
            ids(TriggerPreset::OutputToProgrammable),
            [
                PropertyId::TRIGGER_CONNECTOR,
                PropertyId::OUTPUT_TRIGGER_POLARITY,
                PropertyId::OUTPUT_TRIGGER_KIND
            ]
        );
        let last = TriggerPreset::OutputToProgrammable.writes()[2];
        assert_eq!(last.value, 3.0);
    }

    #[test]
    fn test_output_kind_leaves_output_delay_alone() {
        assert_eq!(PropertyId::OUTPUT_TRIGGER_KIND, PropertyId(0x001C_0160));
        let output_delay = PropertyId(0x001C_0180);
        for preset in TriggerPreset::ALL {
            assert!(
                preset.writes().iter().all(|w| w.property != output_delay),
                "{preset}"
            );
        }
    }

    #[test]
    fn test_sources() {
        assert_eq!(TriggerPreset::InputDefaults.source(), None);
        assert_eq!(
            TriggerPreset::ExternalLevel.source(),
            Some(TriggerSource::External)
        );
        assert!(TriggerPreset::ALL
            .iter()
            .all(|p| p.source().is_none() || !p.writes().is_empty()));
    }
}
