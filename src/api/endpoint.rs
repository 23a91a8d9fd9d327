/// API endpoints, named after their path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// All storage systems bound to the application, no parameters.
    EssList,
    /// Live power readings, requires `sysSn`.
    LastPowerData,
    /// Energy totals of one day, requires `sysSn` and `queryDate`.
    OneDateEnergyBySn,
    /// Power curve of one day, requires `sysSn` and `queryDate`.
    OneDayPowerBySn,
}

impl Endpoint {
    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::EssList => "getEssList",
            Endpoint::LastPowerData => "getLastPowerData",
            Endpoint::OneDateEnergyBySn => "getOneDateEnergyBySn",
            Endpoint::OneDayPowerBySn => "getOneDayPowerBySn",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
