mod channel;
mod connect;
mod lookup;
mod support;
