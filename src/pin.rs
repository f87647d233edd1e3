use embedded_hal::digital::{ErrorType, InputPin, OutputPin, PinState};

/// Internal resistor configuration applied when a pin is switched to input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pull {
    /// Enable the internal pull-up so an idle line reads high.
    Up,
    /// Leave the line floating.
    None,
}

/// A GPIO whose direction can be switched at runtime.
///
/// `embedded-hal` 1.0 has no direction-switching trait, but single-wire sensors need the host to
/// drive the line for the start signal and then let go of it so the sensor can answer. HALs that
/// expose a flex/bidirectional pin implement this directly; open-drain outputs can be wrapped in
/// [`OpenDrain`].
pub trait IoPin: InputPin + OutputPin {
    /// Stops driving the line and configures the pin to be read.
    fn set_as_input(&mut self, pull: Pull) -> Result<(), Self::Error>;

    /// Starts driving the line at the given level.
    fn set_as_output(&mut self, state: PinState) -> Result<(), Self::Error>;
}

/// Adapts an open-drain pin, which can be read and written without reconfiguration, to [`IoPin`].
///
/// "Input" means releasing the line by writing high, leaving it to the external pull-up. The pin's
/// internal pull configuration is not touched, so [`Pull`] is ignored.
#[derive(Debug)]
pub struct OpenDrain<P>(P);

impl<P> OpenDrain<P>
where
    P: InputPin + OutputPin,
{
    pub fn new(pin: P) -> OpenDrain<P> {
        OpenDrain(pin)
    }

    /// Returns the wrapped pin.
    pub fn into_inner(self) -> P {
        self.0
    }
}

impl<P> ErrorType for OpenDrain<P>
where
    P: InputPin + OutputPin,
{
    type Error = P::Error;
}

impl<P> InputPin for OpenDrain<P>
where
    P: InputPin + OutputPin,
{
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.0.is_low()
    }
}

impl<P> OutputPin for OpenDrain<P>
where
    P: InputPin + OutputPin,
{
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }
}

impl<P> IoPin for OpenDrain<P>
where
    P: InputPin + OutputPin,
{
    fn set_as_input(&mut self, _pull: Pull) -> Result<(), Self::Error> {
        self.0.set_high()
    }

    fn set_as_output(&mut self, state: PinState) -> Result<(), Self::Error> {
        self.0.set_state(state)
    }
}
