use crate::api::transport::{ReqwestTransport, Transport};
use crate::configuration::Configuration;
use std::fmt;
use std::sync::Arc;

/// Pairs a `Configuration` with the `Transport` requests are sent through.
///
/// Controllers share a connector through an `Arc`; replacing it on a controller resets it.
pub struct Connector {
    configuration: Option<Configuration>,
    transport: Option<Arc<dyn Transport>>,
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("configuration", &self.configuration)
            .field("transport", &self.transport.is_some())
            .finish()
    }
}

impl Default for Connector {
    fn default() -> Self {
        Connector {
            configuration: None,
            transport: None,
        }
    }
}

impl Connector {
    pub fn new(configuration: Configuration, transport: Arc<dyn Transport>) -> Self {
        Connector {
            configuration: Some(configuration),
            transport: Some(transport),
        }
    }

    /// Connector using a default `reqwest` client.
    pub fn with_reqwest(configuration: Configuration) -> Result<Self, crate::api::Error> {
        let transport = ReqwestTransport::new()?;
        Ok(Connector::new(configuration, Arc::new(transport)))
    }

    pub fn configuration(&self) -> Option<&Configuration> {
        self.configuration.as_ref()
    }

    /// Mutable access to the configuration, creating a default one if none is set.
    pub fn configuration_mut(&mut self) -> &mut Configuration {
        self.configuration.get_or_insert_with(Configuration::default)
    }

    pub fn set_configuration(&mut self, configuration: Option<Configuration>) {
        self.configuration = configuration;
    }

    pub fn transport(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.as_ref()
    }

    pub fn set_transport(&mut self, transport: Option<Arc<dyn Transport>>) {
        self.transport = transport;
    }

    pub fn valid(&self) -> bool {
        self.configuration
            .as_ref()
            .map(Configuration::valid)
            .unwrap_or(false)
            && self.transport.is_some()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::transport::{RequestDescriptor, TransportFailure};

    struct NullTransport;

    #[async_trait::async_trait]
    impl Transport for NullTransport {
        async fn send(&self, _: RequestDescriptor) -> Result<Vec<u8>, TransportFailure> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn validity() {
        let mut connector = Connector::default();
        assert!(!connector.valid());

        connector
            .configuration_mut()
            .set_app_id("alpha123456");
        connector
            .configuration_mut()
            .set_app_secret("abc123456789");
        assert!(connector.configuration().unwrap().valid());
        assert!(!connector.valid());

        connector.set_transport(Some(Arc::new(NullTransport)));
        assert!(connector.valid());

        connector.set_configuration(None);
        assert!(!connector.valid());
    }
}
