//! IO-Link transport stack for the flow sensor: SPI bus-master driver,
//! M-sequence codec and ISDU parameter reads.

pub mod codec;
pub mod isdu;
pub mod master;
