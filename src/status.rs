use std::fmt;

/// First protocol status code. Raw codes below it are operating system errors.
pub const IP_STATUS_BASE: u32 = 11000;

/// Raw code an [`EchoChannel`] returns when an asynchronous submission will
/// complete later through its [`WaitEvent`].
///
/// [`EchoChannel`]: crate::backend::EchoChannel
/// [`WaitEvent`]: crate::backend::WaitEvent
pub const PENDING: u32 = libc::EINPROGRESS as u32;

/// Outcome of an echo exchange as observed by the operating system.
///
/// Everything other than [`IpStatus::Success`] is still a valid reply: the
/// exchange happened, the target just didn't answer with an echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpStatus {
    Success,
    DestinationNetworkUnreachable,
    DestinationHostUnreachable,
    DestinationProtocolUnreachable,
    DestinationPortUnreachable,
    NoResources,
    BadOption,
    HardwareError,
    PacketTooBig,
    TimedOut,
    BadRoute,
    TtlExpired,
    TtlReassemblyTimeExceeded,
    ParameterProblem,
    SourceQuench,
    BadDestination,
    DestinationProhibited,
    DestinationUnreachable,
    TimeExceeded,
    BadHeader,
    UnrecognizedNextHeader,
    IcmpError,
    DestinationScopeMismatch,
    GeneralFailure,
    /// A protocol status this crate has no name for.
    Unknown(u32),
}

impl IpStatus {
    /// Map a raw code at or above [`IP_STATUS_BASE`] (or zero) to a status.
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::Success,
            11002 => Self::DestinationNetworkUnreachable,
            11003 => Self::DestinationHostUnreachable,
            11004 => Self::DestinationProtocolUnreachable,
            11005 => Self::DestinationPortUnreachable,
            11006 => Self::NoResources,
            11007 => Self::BadOption,
            11008 => Self::HardwareError,
            11009 => Self::PacketTooBig,
            11010 => Self::TimedOut,
            11012 => Self::BadRoute,
            11013 => Self::TtlExpired,
            11014 => Self::TtlReassemblyTimeExceeded,
            11015 => Self::ParameterProblem,
            11016 => Self::SourceQuench,
            11018 => Self::BadDestination,
            11019 => Self::DestinationProhibited,
            11040 => Self::DestinationUnreachable,
            11041 => Self::TimeExceeded,
            11042 => Self::BadHeader,
            11043 => Self::UnrecognizedNextHeader,
            11044 => Self::IcmpError,
            11045 => Self::DestinationScopeMismatch,
            11050 => Self::GeneralFailure,
            other => Self::Unknown(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::Success => 0,
            Self::DestinationNetworkUnreachable => 11002,
            Self::DestinationHostUnreachable => 11003,
            Self::DestinationProtocolUnreachable => 11004,
            Self::DestinationPortUnreachable => 11005,
            Self::NoResources => 11006,
            Self::BadOption => 11007,
            Self::HardwareError => 11008,
            Self::PacketTooBig => 11009,
            Self::TimedOut => 11010,
            Self::BadRoute => 11012,
            Self::TtlExpired => 11013,
            Self::TtlReassemblyTimeExceeded => 11014,
            Self::ParameterProblem => 11015,
            Self::SourceQuench => 11016,
            Self::BadDestination => 11018,
            Self::DestinationProhibited => 11019,
            Self::DestinationUnreachable => 11040,
            Self::TimeExceeded => 11041,
            Self::BadHeader => 11042,
            Self::UnrecognizedNextHeader => 11043,
            Self::IcmpError => 11044,
            Self::DestinationScopeMismatch => 11045,
            Self::GeneralFailure => 11050,
            Self::Unknown(code) => code,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for IpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Success => "success",
            Self::DestinationNetworkUnreachable => "destination network unreachable",
            Self::DestinationHostUnreachable => "destination host unreachable",
            Self::DestinationProtocolUnreachable => "destination protocol unreachable",
            Self::DestinationPortUnreachable => "destination port unreachable",
            Self::NoResources => "no resources",
            Self::BadOption => "bad option",
            Self::HardwareError => "hardware error",
            Self::PacketTooBig => "packet too big",
            Self::TimedOut => "request timed out",
            Self::BadRoute => "bad route",
            Self::TtlExpired => "TTL expired in transit",
            Self::TtlReassemblyTimeExceeded => "TTL expired during reassembly",
            Self::ParameterProblem => "parameter problem",
            Self::SourceQuench => "source quench",
            Self::BadDestination => "bad destination",
            Self::DestinationProhibited => "communication administratively prohibited",
            Self::DestinationUnreachable => "destination unreachable",
            Self::TimeExceeded => "time exceeded",
            Self::BadHeader => "bad header",
            Self::UnrecognizedNextHeader => "unrecognized next header",
            Self::IcmpError => "ICMP error",
            Self::DestinationScopeMismatch => "destination scope mismatch",
            Self::GeneralFailure => "general failure",
            Self::Unknown(code) => return write!(f, "unknown status {code}"),
        };
        f.write_str(text)
    }
}

/// How the engine treats a raw code coming back from a channel or a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RawStatus {
    Success,
    Os(u32),
    Protocol(IpStatus),
}

impl RawStatus {
    pub(crate) fn classify(code: u32) -> Self {
        match code {
            0 => Self::Success,
            code if code < IP_STATUS_BASE => Self::Os(code),
            code => Self::Protocol(IpStatus::from_code(code)),
        }
    }
}
