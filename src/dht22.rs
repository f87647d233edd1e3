use core::fmt;
use core::future::Future;
use core::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, PinState};
use log::{debug, trace, warn};

use crate::pin::{IoPin, Pull};

/// The minimum read interval of a DHT22.
///
/// The sensor needs this long to settle between samples. Reading sooner yields garbage or no
/// response at all, so [`Dht22::read`] waits out whatever remains of this interval.
pub const MIN_READ_INTERVAL: Duration = Duration::from_millis(2000);

/// How long the sensor may take to flip the line during the handshake or a data bit.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_micros(200);

/// HIGH pulses strictly longer than this decode as a 1 bit.
pub const DEFAULT_BIT_THRESHOLD: Duration = Duration::from_micros(50);

// Host holds the line low at least this long to wake the sensor.
const START_SIGNAL_LOW_US: u32 = 18_000;
const START_SIGNAL_HIGH_US: u32 = 30;

const FRAME_LEN: usize = 5;
const FRAME_BITS: usize = FRAME_LEN * 8;

// Physical bounds, in tenths of a unit.
const MAX_HUMIDITY_X10: u16 = 1000;
const MIN_TEMPERATURE_X10: i16 = -400;
const MAX_TEMPERATURE_X10: i16 = 800;

#[derive(Debug, PartialEq)]
pub enum Error<TIoError> {
    /// Wrapped error from the HAL.
    Wrapped(TIoError),
    /// Invalid argument was provided.
    InvalidArgument,
    /// A read was attempted before [`Dht22::init`].
    NotInitialized,
    /// The sensor did not flip the line in time, during either the handshake or a data bit.
    Timeout,
    /// The transmitted checksum does not match the data bytes.
    ChecksumMismatch,
    /// The decoded values are outside the sensor's physical range.
    InvalidData,
}

impl<TIoError> From<TIoError> for Error<TIoError> {
    fn from(error: TIoError) -> Error<TIoError> {
        Error::Wrapped(error)
    }
}

impl<TIoError> fmt::Display for Error<TIoError>
where
    TIoError: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Wrapped(error) => write!(f, "pin error: {:?}", error),
            Error::InvalidArgument => f.write_str("invalid argument"),
            Error::NotInitialized => f.write_str("driver not initialized"),
            Error::Timeout => f.write_str("timed out waiting for the sensor"),
            Error::ChecksumMismatch => f.write_str("checksum mismatch"),
            Error::InvalidData => f.write_str("reading out of physical range"),
        }
    }
}

/// A validated temperature and humidity measurement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reading {
    /// Temperature in degrees Celsius, in the range -40 to 80.
    pub temperature: f32,
    /// Relative humidity in percent, in the range 0 to 100.
    pub humidity: f32,
    /// The temperature as transmitted, in tenths of a degree.
    pub temperature_x10: i16,
    /// The humidity as transmitted, in tenths of a percent.
    pub humidity_x10: u16,
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}°C, {:.1}%", self.temperature, self.humidity)
    }
}

/// The five bytes sent by the sensor for a single read.
///
/// Layout, most significant bit first:
///
/// | byte | contents |
/// |------|----------|
/// | 0    | humidity x10, high byte |
/// | 1    | humidity x10, low byte |
/// | 2    | bit 7: temperature sign; bits 0-6: temperature x10 magnitude, high bits |
/// | 3    | temperature x10 magnitude, low byte |
/// | 4    | checksum: low 8 bits of the sum of bytes 0-3 |
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawFrame([u8; FRAME_LEN]);

impl RawFrame {
    pub const fn from_bytes(bytes: [u8; FRAME_LEN]) -> RawFrame {
        RawFrame(bytes)
    }

    pub fn bytes(&self) -> [u8; FRAME_LEN] {
        self.0
    }

    /// The checksum transmitted by the sensor.
    pub fn checksum(&self) -> u8 {
        self.0[4]
    }

    /// The checksum computed from the four data bytes.
    pub fn computed_checksum(&self) -> u8 {
        self.0[..4]
            .iter()
            .fold(0u8, |sum, byte| sum.wrapping_add(*byte))
    }

    pub fn verify_checksum(&self) -> bool {
        self.computed_checksum() == self.checksum()
    }

    /// Relative humidity in tenths of a percent.
    pub fn humidity_x10(&self) -> u16 {
        u16::from_be_bytes([self.0[0], self.0[1]])
    }

    /// Temperature in tenths of a degree Celsius.
    ///
    /// The sensor uses sign-magnitude rather than two's complement: bit 7 of byte 2 is the sign
    /// and the remaining 15 bits are the magnitude.
    pub fn temperature_x10(&self) -> i16 {
        let magnitude = i16::from_be_bytes([self.0[2] & 0x7F, self.0[3]]);
        if self.0[2] & 0x80 != 0 {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Converts the frame to physical units, or `None` if either value is out of range.
    ///
    /// This does not look at the checksum. Out-of-range values are rejected, never clamped.
    pub fn to_reading(&self) -> Option<Reading> {
        let humidity_x10 = self.humidity_x10();
        let temperature_x10 = self.temperature_x10();
        if humidity_x10 > MAX_HUMIDITY_X10
            || temperature_x10 < MIN_TEMPERATURE_X10
            || temperature_x10 > MAX_TEMPERATURE_X10
        {
            return None;
        }

        Some(Reading {
            temperature: f32::from(temperature_x10) / 10.0,
            humidity: f32::from(humidity_x10) / 10.0,
            temperature_x10,
            humidity_x10,
        })
    }

    #[inline]
    fn set_bit(&mut self, index: usize) {
        self.0[index / 8] |= 1 << (7 - (index % 8));
    }
}

/// The steps of a read, in the order they are reached.
///
/// Every step can fail, in which case the read stops there. See [`Dht22::last_stage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Nothing has happened yet, or the driver was not initialized.
    NotInitialized,
    /// The minimum read interval has passed.
    Paced,
    /// The start signal was sent and the line released.
    SignalSent,
    /// The sensor answered with its low/high/low handshake.
    HandshakeOk,
    /// All 40 bits were received.
    DataSampled,
    /// The checksum matched.
    ChecksumOk,
    /// The frame converted to an in-range [`Reading`].
    Converted,
}

/// Options to modify the behavior of the DHT22 driver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Options {
    /// The minimum time interval that must pass between reads. Cannot be below
    /// [`MIN_READ_INTERVAL`].
    pub min_read_interval: Duration,
    /// The longest the sensor may take to change the line level while answering.
    pub response_timeout: Duration,
    /// HIGH pulses longer than this decode as 1. Must be shorter than `response_timeout`.
    pub bit_threshold: Duration,
}

pub const DEFAULT_OPTIONS: Options = Options {
    min_read_interval: MIN_READ_INTERVAL,
    response_timeout: DEFAULT_RESPONSE_TIMEOUT,
    bit_threshold: DEFAULT_BIT_THRESHOLD,
};

impl Options {
    fn is_valid(&self) -> bool {
        self.min_read_interval >= MIN_READ_INTERVAL
            && !self.bit_threshold.is_zero()
            && self.response_timeout > self.bit_threshold
    }
}

impl Default for Options {
    fn default() -> Options {
        DEFAULT_OPTIONS
    }
}

/// A DHT22 connected to a single bidirectional pin.
#[derive(Debug)]
pub struct Dht22<TPin, TDelay, TimeFn, ElapsedFn, TTime>
where
    TimeFn: Fn() -> TTime,
    ElapsedFn: Fn(TTime) -> Duration,
    TTime: Copy,
{
    pin: TPin,
    delay: TDelay,
    time_fn: TimeFn,
    elapsed_since_fn: ElapsedFn,
    options: Options,
    initialized: bool,
    last_read_time: Option<TTime>,
    stage: Stage,
}

impl<TPin, TDelay, TimeFn, ElapsedFn, TTime> Dht22<TPin, TDelay, TimeFn, ElapsedFn, TTime>
where
    TPin: IoPin,
    TDelay: DelayNs,
    TimeFn: Fn() -> TTime,
    ElapsedFn: Fn(TTime) -> Duration,
    TTime: Copy,
{
    /// Constructs a DHT22 driver for the given pin.
    ///
    /// The pin is not touched until [`init`](Self::init) is called. If `options` is `None`,
    /// [`DEFAULT_OPTIONS`] is used; otherwise the options are validated and
    /// [`Error::InvalidArgument`] is returned if they are rejected.
    ///
    /// The provided `time_fn` closure should provide some representation of a given instant that
    /// can be used with `elapsed_since_fn` to determine how much time has passed since then. It
    /// must be monotonic and precise to the microsecond, since data bits are told apart by pulse
    /// widths of roughly 26us and 70us.
    pub fn new(
        pin: TPin,
        delay: TDelay,
        time_fn: TimeFn,
        elapsed_since_fn: ElapsedFn,
        options: Option<Options>,
    ) -> Result<Dht22<TPin, TDelay, TimeFn, ElapsedFn, TTime>, Error<TPin::Error>> {
        let options = match options {
            None => DEFAULT_OPTIONS,
            Some(options) if options.is_valid() => options,
            Some(options) => {
                warn!("dht22: rejected options {:?}", options);
                return Err(Error::InvalidArgument);
            }
        };

        Ok(Dht22 {
            pin,
            delay,
            time_fn,
            elapsed_since_fn,
            options,
            initialized: false,
            last_read_time: None,
            stage: Stage::NotInitialized,
        })
    }

    /// Configures the pin as an input with pull-up and resets the driver.
    ///
    /// Whether the pull-up is actually enabled is up to the pin's [`IoPin`] implementation.
    /// [`OpenDrain`](crate::pin::OpenDrain) cannot configure one and only releases the line, so
    /// with it the data line needs an external pull-up resistor (most DHT22 modules have one).
    ///
    /// Safe to call more than once. Each call forgets the previous read time, so the next read
    /// is not paced.
    pub fn init(&mut self) -> Result<(), Error<TPin::Error>> {
        self.pin.set_as_input(Pull::Up)?;
        self.last_read_time = None;
        self.stage = Stage::NotInitialized;
        self.initialized = true;
        debug!("dht22: initialized with {:?}", self.options);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The furthest [`Stage`] the most recent read reached.
    ///
    /// After a failed read, this tells where it stopped: e.g. [`Stage::SignalSent`] after a
    /// handshake timeout, or [`Stage::DataSampled`] after a checksum mismatch.
    pub fn last_stage(&self) -> Stage {
        self.stage
    }

    /// Releases the pin and delay provider.
    pub fn release(self) -> (TPin, TDelay) {
        (self.pin, self.delay)
    }

    /// Reads a single temperature and humidity measurement.
    ///
    /// If called within the minimum read interval of the previous read, this first blocks on the
    /// delay provider for the remainder of the interval. The read itself blocks for the 18ms start
    /// signal plus about 4-5ms of busy-waiting while the sensor transmits.
    ///
    /// No retries are made. After any error the driver stays usable and the caller may read
    /// again.
    pub fn read(&mut self) -> Result<Reading, Error<TPin::Error>> {
        self.begin_read()?;
        if let Some(to_wait) = self.time_until_next_read() {
            debug!("dht22: waiting {:?} before next read", to_wait);
            block_for(&mut self.delay, to_wait);
        }
        self.enter(Stage::Paced);
        self.read_frame()
    }

    /// Like [`read`](Self::read), but waits out the minimum read interval with the provided
    /// `delay_fn` instead of blocking.
    ///
    /// Everything from the start signal on is still blocking, since the sensor's timing cannot
    /// tolerate the executor switching tasks.
    pub async fn read_async<DelayFn, EmptyFuture>(
        &mut self,
        delay_fn: DelayFn,
    ) -> Result<Reading, Error<TPin::Error>>
    where
        DelayFn: Fn(Duration) -> EmptyFuture,
        EmptyFuture: Future<Output = ()>,
    {
        self.begin_read()?;
        if let Some(to_wait) = self.time_until_next_read() {
            debug!("dht22: waiting {:?} before next read", to_wait);
            delay_fn(to_wait).await;
        }
        self.enter(Stage::Paced);
        self.read_frame()
    }

    fn begin_read(&mut self) -> Result<(), Error<TPin::Error>> {
        self.stage = Stage::NotInitialized;
        if !self.initialized {
            warn!("dht22: read before init");
            return Err(Error::NotInitialized);
        }
        Ok(())
    }

    fn time_until_next_read(&self) -> Option<Duration> {
        let last_read_time = self.last_read_time?;
        let elapsed = (self.elapsed_since_fn)(last_read_time);
        self.options
            .min_read_interval
            .checked_sub(elapsed)
            .filter(|remaining| !remaining.is_zero())
    }

    fn read_frame(&mut self) -> Result<Reading, Error<TPin::Error>> {
        self.send_start_signal()?;
        self.enter(Stage::SignalSent);

        // Nothing may log between releasing the line and the last data bit.
        let sampled = self.wait_for_response().and_then(|()| {
            self.enter(Stage::HandshakeOk);
            self.receive_frame()
        });
        let frame = match sampled {
            Ok(frame) => frame,
            Err(err) => {
                warn!("dht22: aborted after {:?}: {}", self.stage, err);
                return Err(err);
            }
        };
        // The interval tracks bus activity, so it restarts even if the frame turns out bad.
        self.last_read_time = Some((self.time_fn)());
        self.enter(Stage::DataSampled);
        trace!("dht22: Paced -> SignalSent -> HandshakeOk -> DataSampled");
        debug!("dht22: received {:02x?}", frame.bytes());

        if !frame.verify_checksum() {
            warn!(
                "dht22: checksum mismatch, computed {:#04x} but received {:#04x}",
                frame.computed_checksum(),
                frame.checksum()
            );
            return Err(Error::ChecksumMismatch);
        }
        self.enter(Stage::ChecksumOk);
        trace!("dht22: DataSampled -> ChecksumOk");

        let reading = match frame.to_reading() {
            Some(reading) => reading,
            None => {
                warn!(
                    "dht22: out of range, humidity x10 = {}, temperature x10 = {}",
                    frame.humidity_x10(),
                    frame.temperature_x10()
                );
                return Err(Error::InvalidData);
            }
        };
        self.enter(Stage::Converted);
        trace!("dht22: ChecksumOk -> Converted");
        Ok(reading)
    }

    fn send_start_signal(&mut self) -> Result<(), Error<TPin::Error>> {
        self.pin.set_as_output(PinState::Low)?;
        self.delay.delay_us(START_SIGNAL_LOW_US);
        self.pin.set_high()?;
        self.delay.delay_us(START_SIGNAL_HIGH_US);
        self.pin.set_as_input(Pull::Up)?;
        Ok(())
    }

    fn wait_for_response(&mut self) -> Result<(), Error<TPin::Error>> {
        let timeout = self.options.response_timeout;
        for level in [PinState::Low, PinState::High, PinState::Low] {
            wait_for_level(
                &mut self.pin,
                level,
                timeout,
                &self.time_fn,
                &self.elapsed_since_fn,
            )?;
        }
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<RawFrame, Error<TPin::Error>> {
        let timeout = self.options.response_timeout;
        let threshold = self.options.bit_threshold;
        let mut frame = RawFrame::default();

        for i in 0..FRAME_BITS {
            wait_for_level(
                &mut self.pin,
                PinState::High,
                timeout,
                &self.time_fn,
                &self.elapsed_since_fn,
            )?;
            let high_duration = wait_for_level(
                &mut self.pin,
                PinState::Low,
                timeout,
                &self.time_fn,
                &self.elapsed_since_fn,
            )?;
            if high_duration > threshold {
                frame.set_bit(i);
            }
        }

        Ok(frame)
    }

    // Only records the stage; logging here would land inside the timing window.
    fn enter(&mut self, stage: Stage) {
        self.stage = stage;
    }
}

/// Polls `pin` until it reads `level`, returning how long that took.
#[inline]
fn wait_for_level<TInput, TimeFn, ElapsedFn, TTime>(
    pin: &mut TInput,
    level: PinState,
    timeout: Duration,
    time_fn: &TimeFn,
    elapsed_since_fn: &ElapsedFn,
) -> Result<Duration, Error<TInput::Error>>
where
    TInput: InputPin,
    TimeFn: Fn() -> TTime,
    ElapsedFn: Fn(TTime) -> Duration,
    TTime: Copy,
{
    let start = time_fn();
    loop {
        let reached = match level {
            PinState::High => pin.is_high()?,
            PinState::Low => pin.is_low()?,
        };
        let elapsed = elapsed_since_fn(start);
        if reached {
            return Ok(elapsed);
        }
        if elapsed > timeout {
            return Err(Error::Timeout);
        }
    }
}

fn block_for<TDelay: DelayNs>(delay: &mut TDelay, duration: Duration) {
    let mut millis = duration.as_millis();
    while millis > 0 {
        let chunk = u32::try_from(millis).unwrap_or(u32::MAX);
        delay.delay_ms(chunk);
        millis -= u128::from(chunk);
    }
    delay.delay_ns(duration.subsec_nanos() % 1_000_000);
}
