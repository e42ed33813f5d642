use crate::resource::Resource;

/// LICENSE and NOTICE files bundled with a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct License {
  resource: Resource,
}

impl License {
  pub const NAME: &'static str = "license";

  pub fn new(resource: Resource) -> Self {
    Self { resource }
  }

  pub fn name(&self) -> &str {
    self.resource.name()
  }

  pub fn fingerprint(&self) -> &str {
    self.resource.fingerprint()
  }

  pub fn resource(&self) -> &Resource {
    &self.resource
  }

  pub fn resource_mut(&mut self) -> &mut Resource {
    &mut self.resource
  }
}
