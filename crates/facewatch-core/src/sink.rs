use crate::events::{AlertEvent, DoorCommand, IdentityEvent};
use image::RgbImage;

/// Receiver for everything the recognition pipeline decides.
///
/// Every method is fire-and-forget: implementations own their delivery,
/// retries and error reporting, and must return without blocking on I/O.
pub trait EventSink {
    /// A confirmed identity transition.
    fn on_identity(&mut self, event: &IdentityEvent);

    /// A known person was confirmed; open the door for them.
    fn on_door_open(&mut self, command: &DoorCommand);

    /// An unknown subject passed the alert throttle. `evidence` is the frame
    /// on which the transition was confirmed.
    fn on_alert(&mut self, event: &AlertEvent, evidence: &RgbImage);
}
