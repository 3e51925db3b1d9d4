use tera::{Context, Tera};
use thiserror::Error;

use dialout_core::Specialization;

use crate::manager::{CustomerFields, DeliveryMode};

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script template rendering failed: {0}")]
    Render(#[from] tera::Error),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallScript {
    pub script: String,
    pub opening_line: String,
}

const ORDER_SCRIPT: &str = "\
You are a polite phone agent calling {{ business_name }} to place a {{ delivery_mode }} order on behalf of {{ customer_name }}.
Items to order:
{% for item in items %}- {{ item }}
{% endfor %}\
{% if address %}Deliver to: {{ address }}.
{% endif %}\
{% if notes %}Notes from the customer: {{ notes }}.
{% endif %}\
Confirm the total price and the expected {{ delivery_mode }} time before ending the call.
If an item is unavailable, ask for the closest substitute and accept only a near match.";

const ORDER_OPENING: &str =
    "Hi, I'd like to place a {{ delivery_mode }} order for {{ customer_name }}.";

const RESERVATION_SCRIPT: &str = "\
You are a polite phone agent calling {{ business_name }} to book a table for {{ customer_name }}.
Party size: {{ party_size }}.
Preferred time: {{ time_preference }}.
{% if notes %}Notes from the customer: {{ notes }}.
{% endif %}\
Confirm the final time and the name the reservation is held under before ending the call.";

const RESERVATION_OPENING: &str =
    "Hi, I'd like to book a table for {{ party_size }} under the name {{ customer_name }}.";

const INQUIRY_SCRIPT: &str = "\
You are a polite phone agent calling {{ business_name }} on behalf of {{ customer_name }}.
Question to ask: {{ question }}
Get a clear answer, thank them, and end the call promptly.";

const INQUIRY_OPENING: &str = "Hi, I have a quick question about {{ business_name }}.";

/// Renders the specialization-specific call script and opening line handed to
/// a freshly provisioned agent.
pub struct ScriptGenerator {
    tera: Tera,
}

impl ScriptGenerator {
    pub fn new() -> Result<Self, ScriptError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("order_script", ORDER_SCRIPT),
            ("order_opening", ORDER_OPENING),
            ("reservation_script", RESERVATION_SCRIPT),
            ("reservation_opening", RESERVATION_OPENING),
            ("inquiry_script", INQUIRY_SCRIPT),
            ("inquiry_opening", INQUIRY_OPENING),
        ])?;
        Ok(Self { tera })
    }

    pub fn generate(
        &self,
        specialization: Specialization,
        business_name: &str,
        fields: &CustomerFields,
    ) -> Result<CallScript, ScriptError> {
        let mut context = Context::new();
        context.insert("business_name", business_name);
        context.insert("customer_name", &fields.customer_name);
        context.insert("notes", fields.notes.as_deref().unwrap_or(""));

        let (script_template, opening_template) = match specialization {
            Specialization::Order => {
                context.insert("items", &fields.items);
                context.insert("delivery_mode", fields.delivery_mode.label());
                let address = match fields.delivery_mode {
                    DeliveryMode::Delivery => fields.address.as_deref().unwrap_or(""),
                    DeliveryMode::Pickup => "",
                };
                context.insert("address", address);
                ("order_script", "order_opening")
            }
            Specialization::Reservation => {
                context.insert("party_size", &fields.party_size.unwrap_or(0));
                context.insert(
                    "time_preference",
                    fields.time_preference.as_deref().unwrap_or(""),
                );
                ("reservation_script", "reservation_opening")
            }
            Specialization::Inquiry => {
                context.insert("question", fields.notes.as_deref().unwrap_or(""));
                ("inquiry_script", "inquiry_opening")
            }
        };

        Ok(CallScript {
            script: self.tera.render(script_template, &context)?,
            opening_line: self.tera.render(opening_template, &context)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use dialout_core::Specialization;

    use super::ScriptGenerator;
    use crate::manager::{CustomerFields, DeliveryMode};

    fn order_fields() -> CustomerFields {
        CustomerFields {
            customer_name: "Dana Smith".to_owned(),
            items: vec!["large pepperoni pizza".to_owned(), "garlic knots".to_owned()],
            delivery_mode: DeliveryMode::Delivery,
            address: Some("12 Elm St".to_owned()),
            party_size: None,
            time_preference: None,
            notes: Some("ring the doorbell".to_owned()),
        }
    }

    #[test]
    fn order_script_lists_items_and_delivery_address() {
        let generator = ScriptGenerator::new().expect("templates should parse");
        let script = generator
            .generate(Specialization::Order, "Tony's Pizza", &order_fields())
            .expect("render");

        assert!(script.script.contains("Tony's Pizza"));
        assert!(script.script.contains("- large pepperoni pizza"));
        assert!(script.script.contains("- garlic knots"));
        assert!(script.script.contains("Deliver to: 12 Elm St."));
        assert!(script.script.contains("ring the doorbell"));
        assert!(script.opening_line.contains("delivery order for Dana Smith"));
    }

    #[test]
    fn pickup_order_omits_delivery_address() {
        let generator = ScriptGenerator::new().expect("templates should parse");
        let mut fields = order_fields();
        fields.delivery_mode = DeliveryMode::Pickup;

        let script =
            generator.generate(Specialization::Order, "Tony's Pizza", &fields).expect("render");

        assert!(!script.script.contains("Deliver to"));
        assert!(script.script.contains("pickup order"));
    }

    #[test]
    fn reservation_script_carries_party_size_and_time() {
        let generator = ScriptGenerator::new().expect("templates should parse");
        let fields = CustomerFields {
            customer_name: "Dana Smith".to_owned(),
            items: Vec::new(),
            delivery_mode: DeliveryMode::Pickup,
            address: None,
            party_size: Some(4),
            time_preference: Some("tomorrow at 7pm".to_owned()),
            notes: None,
        };

        let script = generator
            .generate(Specialization::Reservation, "Chez Luc", &fields)
            .expect("render");

        assert!(script.script.contains("Party size: 4."));
        assert!(script.script.contains("tomorrow at 7pm"));
        assert!(!script.script.contains("Notes from the customer"));
        assert!(script.opening_line.contains("table for 4"));
    }

    #[test]
    fn inquiry_script_asks_the_supplied_question() {
        let generator = ScriptGenerator::new().expect("templates should parse");
        let fields = CustomerFields {
            customer_name: "Dana Smith".to_owned(),
            items: Vec::new(),
            delivery_mode: DeliveryMode::Pickup,
            address: None,
            party_size: None,
            time_preference: None,
            notes: Some("are you open on Labor Day?".to_owned()),
        };

        let script =
            generator.generate(Specialization::Inquiry, "Chez Luc", &fields).expect("render");

        assert!(script.script.contains("are you open on Labor Day?"));
        assert!(script.opening_line.contains("Chez Luc"));
    }
}
