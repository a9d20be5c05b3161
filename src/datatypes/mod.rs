mod address;
mod data_coding;
mod datetime;
mod delivery_status;
pub mod gsm7;
mod message_type;
mod numeric_plan_indicator;
pub mod semi_octet;
pub mod septets;
mod type_of_number;
pub mod ucs2;
mod user_data_header;
mod validity_period;

pub use address::{Address, decode_address_field, decode_smsc_field, encode_smsc_field};
pub use data_coding::{Alphabet, DataCoding, MessageClass};
pub use datetime::{TIMESTAMP_LEN, decode_timestamp, encode_timestamp};
pub use delivery_status::DeliveryStatus;
pub use message_type::MessageType;
pub use numeric_plan_indicator::{NumericPlanIndicator, type_of_address};
pub use type_of_number::TypeOfNumber;
pub use user_data_header::{InformationElement, decode_user_data_header, encode_user_data_header};
pub use validity_period::{ValidityPeriod, decode_relative_validity, encode_relative_validity};
