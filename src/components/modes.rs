//! Typed values for DCAM mode properties.
//!
//! Each enum maps onto the integer encoding a mode property expects. The
//! [`ModeValue`] trait ties a value type to the property it is written to, so
//! a mode can never be sent to the wrong id.

use crate::api::PropertyId;

/// A value of a specific mode property.
pub trait ModeValue: Copy {
    /// Property this value is written to.
    const PROPERTY: PropertyId;

    /// Raw value as the device encodes it.
    fn to_dcam(self) -> f64;

    /// Parse a raw device value.
    fn from_dcam(raw: f64) -> Option<Self>;
}

macro_rules! mode_enum {
    (
        $(#[$meta:meta])*
        $name:ident => $prop:ident { $($variant:ident = $value:literal => $label:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $(#[doc = $label] $variant,)+
        }

        impl $name {
            /// Human-readable label.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }

            /// Every variant, in device encoding order.
            pub fn all_choices() -> &'static [$name] {
                &[$(Self::$variant,)+]
            }
        }

        impl ModeValue for $name {
            const PROPERTY: PropertyId = PropertyId::$prop;

            fn to_dcam(self) -> f64 {
                match self {
                    $(Self::$variant => $value as f64,)+
                }
            }

            fn from_dcam(raw: f64) -> Option<Self> {
                $(if raw == $value as f64 { return Some(Self::$variant); })+
                None
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

mode_enum! {
    /// Where exposures are started from.
    TriggerSource => TRIGGER_SOURCE {
        Internal = 1 => "Internal",
        External = 2 => "External",
        Software = 3 => "Software",
    }
}

mode_enum! {
    /// How an external trigger signal is interpreted.
    TriggerActive => TRIGGER_ACTIVE {
        Edge = 1 => "Edge",
        Level = 2 => "Level",
        SyncReadout = 3 => "Sync Readout",
    }
}

mode_enum! {
    /// Normal or start trigger mode.
    TriggerMode => TRIGGER_MODE {
        Normal = 1 => "Normal",
        Start = 6 => "Start",
    }
}

mode_enum! {
    /// Input trigger polarity.
    TriggerPolarity => TRIGGER_POLARITY {
        Negative = 1 => "Negative",
        Positive = 2 => "Positive",
    }
}

mode_enum! {
    /// Input trigger connector.
    TriggerConnector => TRIGGER_CONNECTOR {
        Interface = 1 => "Interface",
        Bnc = 2 => "BNC",
    }
}

mode_enum! {
    /// Output trigger polarity.
    OutputTriggerPolarity => OUTPUT_TRIGGER_POLARITY {
        Negative = 1 => "Negative",
        Positive = 2 => "Positive",
    }
}

mode_enum! {
    /// What the output trigger line reports.
    OutputTriggerKind => OUTPUT_TRIGGER_KIND {
        Low = 1 => "Low",
        Exposure = 2 => "Exposure",
        Programmable = 3 => "Programmable",
        TriggerReady = 4 => "Trigger Ready",
        High = 5 => "High",
    }
}

mode_enum! {
    /// Sub-array readout switch.
    SubarrayMode => SUBARRAY_MODE {
        Off = 1 => "Off",
        On = 2 => "On",
    }
}

mode_enum! {
    /// Pixel defect correction switch.
    DefectCorrection => DEFECT_CORRECT_MODE {
        Off = 1 => "Off",
        On = 2 => "On",
    }
}

impl TriggerSource {
    /// Whether capture waits for a trigger before exposing.
    pub fn waits_for_trigger(&self) -> bool {
        matches!(self, Self::External | Self::Software)
    }
}

impl From<bool> for DefectCorrection {
    fn from(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }
}
