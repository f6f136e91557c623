// Safety envelopes: flight (attitude rate, altitude) and mission
// (theater geofence, timed target window).

pub mod envelope;
