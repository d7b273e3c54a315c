//! Concrete transport modules (spec.md §4.1, §6).

pub mod ethernet;
pub mod loopback;
pub mod tcp;
pub mod template;
pub mod udp;

pub use ethernet::EthernetModule;
pub use loopback::LoopbackModule;
pub use tcp::TcpModule;
pub use template::TemplateModule;
pub use udp::UdpModule;
