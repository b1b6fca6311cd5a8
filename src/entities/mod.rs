pub mod alerts;
pub mod animal;
pub mod breeding;
pub mod milking;
pub mod property;
pub mod treatment;
pub mod vaccination;
pub mod weighing;

pub use alerts::Entity as Alerts;
pub use animal::Entity as Animal;
pub use breeding::Entity as Breeding;
pub use milking::Entity as Milking;
pub use property::Entity as Property;
pub use treatment::Entity as Treatment;
pub use vaccination::Entity as Vaccination;
pub use weighing::Entity as Weighing;
