use chrono::NaiveDateTime;

use crate::array::Array;

use super::AsdfError;

/// The format of the start and end times in a waveform dataset name.
pub const TRACE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// The parsed name of a waveform dataset, `NET.STA.LOC.CHA__<start>__<end>__<tag>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceName {
    network: String,
    station: String,
    location: String,
    channel: String,
    starttime: NaiveDateTime,
    endtime: NaiveDateTime,
    tag: String,
}

impl TraceName {
    /// Parse a waveform dataset name.
    ///
    /// The tag is optional.
    ///
    /// # Errors
    /// Returns [`AsdfError::InvalidTraceName`] if `name` is not a valid waveform dataset name.
    pub fn parse(name: &str) -> Result<Self, AsdfError> {
        let invalid = |reason: &str| AsdfError::InvalidTraceName {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        let mut parts = name.split("__");
        let (Some(id), Some(start), Some(end)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid("expected NET.STA.LOC.CHA__<start>__<end>"));
        };
        let tag = parts.collect::<Vec<_>>().join("__");

        let [network, station, location, channel] = id
            .split('.')
            .collect::<Vec<_>>()
            .try_into()
            .map_err(|_| invalid("expected a NET.STA.LOC.CHA identifier"))?;
        let starttime = NaiveDateTime::parse_from_str(start, TRACE_TIME_FORMAT)
            .map_err(|err| invalid(&format!("start time {start}: {err}")))?;
        let endtime = NaiveDateTime::parse_from_str(end, TRACE_TIME_FORMAT)
            .map_err(|err| invalid(&format!("end time {end}: {err}")))?;
        if endtime < starttime {
            return Err(invalid("end time precedes start time"));
        }

        Ok(Self {
            network: network.to_string(),
            station: station.to_string(),
            location: location.to_string(),
            channel: channel.to_string(),
            starttime,
            endtime,
            tag,
        })
    }

    /// Return the `NET.STA.LOC.CHA` identifier.
    #[must_use]
    pub fn id(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.network, self.station, self.location, self.channel
        )
    }

    /// Return the tag, which is empty if the name has none.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Return the trace duration in seconds.
    #[must_use]
    pub fn duration_seconds(&self) -> i64 {
        (self.endtime - self.starttime).num_seconds()
    }
}

/// A waveform trace.
#[derive(Clone, Debug, PartialEq)]
pub struct Trace {
    name: TraceName,
    sampling_rate: f64,
    data: Array,
}

impl Trace {
    /// Create a trace from its name and samples.
    ///
    /// The sampling rate is `(npts - 1) / duration`, or 0 if the trace has fewer than two samples or no duration.
    #[must_use]
    pub fn new(name: TraceName, data: Array) -> Self {
        let npts = data.num_elements();
        let duration = name.duration_seconds();
        #[allow(clippy::cast_precision_loss)]
        let sampling_rate = if npts > 1 && duration > 0 {
            (npts - 1) as f64 / duration as f64
        } else {
            0.0
        };
        Self {
            name,
            sampling_rate,
            data,
        }
    }

    /// Return the parsed dataset name.
    #[must_use]
    pub fn name(&self) -> &TraceName {
        &self.name
    }

    /// Return the network code.
    #[must_use]
    pub fn network(&self) -> &str {
        &self.name.network
    }

    /// Return the station code.
    #[must_use]
    pub fn station(&self) -> &str {
        &self.name.station
    }

    /// Return the location code.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.name.location
    }

    /// Return the channel code.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.name.channel
    }

    /// Return the start time.
    #[must_use]
    pub fn starttime(&self) -> NaiveDateTime {
        self.name.starttime
    }

    /// Return the end time.
    #[must_use]
    pub fn endtime(&self) -> NaiveDateTime {
        self.name.endtime
    }

    /// Return the sampling rate in Hz.
    #[must_use]
    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    /// Return the number of samples.
    #[must_use]
    pub fn npts(&self) -> u64 {
        self.data.num_elements()
    }

    /// Return the samples.
    #[must_use]
    pub fn data(&self) -> &Array {
        &self.data
    }

    /// Convert into the samples.
    #[must_use]
    pub fn into_data(self) -> Array {
        self.data
    }
}
