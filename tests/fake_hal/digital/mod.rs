use super::clock;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin, PinState};
use simple_dht22::pin::{IoPin, Pull};
use std::collections::VecDeque;
use std::convert::Infallible;

/// A stretch of time, in microseconds, during which the sensor holds the line at one level.
#[derive(Clone, Copy, Debug)]
pub struct Segment {
    pub high: bool,
    pub micros: u64,
}

/// A fake data line with a simulated sensor on the other end.
///
/// Each time the host releases the line after driving it, the next queued waveform starts
/// playing. Outside of a waveform the line idles at the level given by the pull resistor.
#[derive(Debug)]
pub struct Pin {
    name: &'static str,
    waveforms: VecDeque<Vec<Segment>>,
    playing: Option<(u64, Vec<Segment>)>,
    driven: Option<PinState>,
    pull: Pull,
    start_signals: Vec<u64>,
}

impl Pin {
    pub fn new(name: &'static str) -> Pin {
        clock::reset(name);
        Pin {
            name,
            waveforms: VecDeque::new(),
            playing: None,
            driven: None,
            pull: Pull::None,
            start_signals: Vec::new(),
        }
    }

    /// Queues the sensor's answer to the next start signal.
    pub fn push_waveform(&mut self, waveform: Vec<Segment>) {
        self.waveforms.push_back(waveform);
    }

    pub fn pull(&self) -> Pull {
        self.pull
    }

    pub fn is_driven(&self) -> bool {
        self.driven.is_some()
    }

    /// Clock times at which the host started pulling the line low.
    pub fn start_signals(&self) -> &[u64] {
        &self.start_signals
    }

    fn level_at(&self, time: u64) -> bool {
        if let Some(state) = self.driven {
            return state == PinState::High;
        }
        let idle = self.pull == Pull::Up;
        let (released_at, waveform) = match &self.playing {
            Some(playing) => playing,
            None => return idle,
        };
        let mut offset = time - released_at;
        for segment in waveform.iter() {
            if offset < segment.micros {
                return segment.high;
            }
            offset -= segment.micros;
        }
        idle
    }

    fn drive(&mut self, state: PinState) {
        if self.driven.is_none() && state == PinState::Low {
            self.start_signals.push(clock::now(self.name));
        }
        self.driven = Some(state);
    }
}

impl ErrorType for Pin {
    type Error = Infallible;
}

impl InputPin for Pin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let time = clock::tick(self.name);
        Ok(self.level_at(time))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        let time = clock::tick(self.name);
        Ok(!self.level_at(time))
    }
}

impl OutputPin for Pin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(PinState::Low);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(PinState::High);
        Ok(())
    }
}

impl IoPin for Pin {
    fn set_as_input(&mut self, pull: Pull) -> Result<(), Self::Error> {
        if self.driven.take().is_some() {
            let now = clock::now(self.name);
            self.playing = self.waveforms.pop_front().map(|waveform| (now, waveform));
        }
        self.pull = pull;
        Ok(())
    }

    fn set_as_output(&mut self, state: PinState) -> Result<(), Self::Error> {
        self.drive(state);
        Ok(())
    }
}
