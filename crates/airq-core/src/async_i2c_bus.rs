//! Shared async I2C bus
//!
//! On the board the BME688 and the OLED display sit on the same I2C
//! peripheral (GP6/GP7). The sensor driver holds its bus handle for the whole
//! of a measurement cycle, so every device gets its own [`SharedI2cBus`]
//! handle and each transaction locks the underlying bus for its duration only.
//! A display refresh can therefore interleave with a long baseline burn-in,
//! but never with a single register transaction.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation, SevenBitAddress};

/// One device's handle onto a bus shared through an embassy async mutex.
///
/// The mutex kind is a parameter so the same handle works with
/// `CriticalSectionRawMutex` on the target (bus shared between tasks and
/// interrupts) and `NoopRawMutex` when everything runs on one executor.
///
/// # Example
///
/// ```no_run
/// use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
/// use embassy_sync::mutex::Mutex;
/// use airq_core::async_i2c_bus::SharedI2cBus;
///
/// # fn demo<T: embedded_hal_async::i2c::I2c>(i2c: T) {
/// let bus: Mutex<CriticalSectionRawMutex, T> = Mutex::new(i2c);
/// let sensor_i2c = SharedI2cBus::new(&bus);
/// let display_i2c = SharedI2cBus::new(&bus);
/// # let _ = (sensor_i2c, display_i2c);
/// # }
/// ```
pub struct SharedI2cBus<'a, M: RawMutex, T> {
    bus: &'a Mutex<M, T>,
}

impl<'a, M: RawMutex, T> SharedI2cBus<'a, M, T> {
    #[inline]
    pub const fn new(bus: &'a Mutex<M, T>) -> Self {
        Self { bus }
    }
}

impl<M: RawMutex, T> Clone for SharedI2cBus<'_, M, T> {
    fn clone(&self) -> Self {
        Self { bus: self.bus }
    }
}

impl<M, T> ErrorType for SharedI2cBus<'_, M, T>
where
    M: RawMutex,
    T: ErrorType,
{
    type Error = T::Error;
}

impl<M, T> I2c<SevenBitAddress> for SharedI2cBus<'_, M, T>
where
    M: RawMutex,
    T: I2c<SevenBitAddress>,
{
    #[inline]
    async fn read(&mut self, address: u8, read: &mut [u8]) -> Result<(), Self::Error> {
        self.bus.lock().await.read(address, read).await
    }

    #[inline]
    async fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
        self.bus.lock().await.write(address, write).await
    }

    /// The register pointer write and the data read happen under one lock, so
    /// another device cannot move the pointer in between.
    #[inline]
    async fn write_read(
        &mut self,
        address: u8,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.bus.lock().await.write_read(address, write, read).await
    }

    #[inline]
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.bus.lock().await.transaction(address, operations).await
    }
}
