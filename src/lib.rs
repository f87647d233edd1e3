#![no_std]

/// Driver for reading from DHT22 (AM2302) temperature and humidity sensors.
///
/// Refer to [this datasheet](https://cdn-shop.adafruit.com/datasheets/Digital+humidity+and+temperature+sensor+AM2302.pdf)
/// for more information about these devices.
pub mod dht22;
/// Direction switching for the single shared data line.
pub mod pin;
