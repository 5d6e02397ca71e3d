// SPDX-License-Identifier: MIT OR Apache-2.0
//! Operations every runtime ships with.
//!
//! The output node is the sink the interpreter evaluates towards; the input
//! and math nodes cover the basic plugin set used to build pipelines.

use crate::anchor::{Anchor, AnchorType};
use crate::operation::{
    Inputs, OperationCategory, OperationDef, OperationError, OperationRegistry, Outputs,
    UiComponent, UiComponentKind, UiInputs,
};
use crate::value::Value;

/// Signature of the global output node
pub const OUTPUT: &str = "core.output";
/// Signature of the number input node
pub const NUMBER: &str = "input.number";
/// Signature of the color input node
pub const COLOR: &str = "input.color";
/// Signature of the boolean input node
pub const BOOLEAN: &str = "input.boolean";
/// Signature of the addition node
pub const ADD: &str = "math.add";
/// Signature of the multiplication node
pub const MULTIPLY: &str = "math.multiply";

/// Input anchor of the output node
pub const OUTPUT_INPUT_KEY: &str = "in";
/// UI input naming the media output an output node feeds
pub const OUTPUT_ID_KEY: &str = "outputId";
/// Output ID of a freshly created output node
pub const DEFAULT_OUTPUT_ID: &str = "default";

/// Create a registry holding only the built-in operations
pub fn create_builtin_registry() -> OperationRegistry {
    let mut registry = OperationRegistry::new();
    register_builtins(&mut registry);
    registry
}

/// Register the built-in operations into an existing registry
pub fn register_builtins(registry: &mut OperationRegistry) {
    // ========================================================================
    // Output
    // ========================================================================

    registry.register(
        OperationDef::new(OUTPUT, "Output", OperationCategory::Output, evaluate_output)
            .with_description(
                "Global output node; accepts data of any type and presents the final value",
            )
            .with_input(Anchor::input(OUTPUT_INPUT_KEY, "In", AnchorType::Any))
            .with_ui(
                UiComponent::new(
                    "export",
                    "Export",
                    UiComponentKind::Button,
                    Value::from("nodeflow.graphs.export"),
                )
                .updates_backend(),
            )
            .with_ui(UiComponent::new(
                OUTPUT_ID_KEY,
                "Output ID",
                UiComponentKind::TextInput,
                Value::from(DEFAULT_OUTPUT_ID),
            )),
    );

    // ========================================================================
    // Inputs
    // ========================================================================

    registry.register(
        OperationDef::new(NUMBER, "Number", OperationCategory::Input, evaluate_number)
            .with_description("Provides a number input and returns a single number output")
            .with_output(Anchor::output("res", "Result", AnchorType::Float))
            .with_ui(
                UiComponent::new(
                    "value",
                    "Input number",
                    UiComponentKind::Slider {
                        min: 0.0,
                        max: 100.0,
                        step: 0.1,
                    },
                    Value::Float(0.0),
                )
                .updates_backend(),
            ),
    );

    registry.register(
        OperationDef::new(COLOR, "Color", OperationCategory::Input, evaluate_color)
            .with_description("Provides a color input and returns a single color output")
            .with_output(Anchor::output("res", "Result", AnchorType::Color))
            .with_ui(
                UiComponent::new(
                    "colorPicker",
                    "Pick a color",
                    UiComponentKind::ColorPicker,
                    Value::Color([1.0, 0.0, 0.0, 1.0]),
                )
                .updates_backend(),
            ),
    );

    registry.register(
        OperationDef::new(BOOLEAN, "Boolean", OperationCategory::Input, evaluate_boolean)
            .with_description("Provides a radio box to select a single true/false value")
            .with_output(Anchor::output("val", "Value", AnchorType::Bool))
            .with_ui(
                UiComponent::new(
                    "radio",
                    "Boolean value",
                    UiComponentKind::Radio {
                        options: vec![
                            ("False".to_string(), "false".to_string()),
                            ("True".to_string(), "true".to_string()),
                        ],
                    },
                    Value::from("false"),
                )
                .updates_backend(),
            ),
    );

    // ========================================================================
    // Math
    // ========================================================================

    registry.register(
        OperationDef::new(ADD, "Add", OperationCategory::Math, evaluate_add)
            .with_description("Adds two numbers")
            .with_input(Anchor::input("a", "A", AnchorType::Float).with_default(Value::Float(0.0)))
            .with_input(Anchor::input("b", "B", AnchorType::Float).with_default(Value::Float(0.0)))
            .with_output(Anchor::output("sum", "Sum", AnchorType::Float)),
    );

    registry.register(
        OperationDef::new(MULTIPLY, "Multiply", OperationCategory::Math, evaluate_multiply)
            .with_description("Multiplies two numbers")
            .with_input(Anchor::input("a", "A", AnchorType::Float).with_default(Value::Float(1.0)))
            .with_input(Anchor::input("b", "B", AnchorType::Float).with_default(Value::Float(1.0)))
            .with_output(Anchor::output("product", "Product", AnchorType::Float)),
    );
}

fn evaluate_output(_inputs: &Inputs, _ui: &UiInputs, _requested: &[String]) -> Result<Outputs, OperationError> {
    // The interpreter forwards the resolved input to the media sinks.
    Ok(Outputs::new())
}

fn evaluate_number(_inputs: &Inputs, ui: &UiInputs, _requested: &[String]) -> Result<Outputs, OperationError> {
    let value = ui
        .get("value")
        .and_then(Value::as_f64)
        .ok_or_else(|| OperationError::new("number input has no numeric `value`"))?;
    Ok(Outputs::from([("res".to_string(), Value::Float(value))]))
}

fn evaluate_color(_inputs: &Inputs, ui: &UiInputs, _requested: &[String]) -> Result<Outputs, OperationError> {
    let color = ui
        .get("colorPicker")
        .cloned()
        .ok_or_else(|| OperationError::new("color input has no `colorPicker` value"))?;
    Ok(Outputs::from([("res".to_string(), color)]))
}

fn evaluate_boolean(_inputs: &Inputs, ui: &UiInputs, _requested: &[String]) -> Result<Outputs, OperationError> {
    let value = match ui.get("radio") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        _ => false,
    };
    Ok(Outputs::from([("val".to_string(), Value::Bool(value))]))
}

fn number(inputs: &Inputs, key: &str) -> Result<f64, OperationError> {
    inputs
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| OperationError::new(format!("input `{key}` is not a number")))
}

fn evaluate_add(inputs: &Inputs, _ui: &UiInputs, _requested: &[String]) -> Result<Outputs, OperationError> {
    let sum = number(inputs, "a")? + number(inputs, "b")?;
    Ok(Outputs::from([("sum".to_string(), Value::Float(sum))]))
}

fn evaluate_multiply(inputs: &Inputs, _ui: &UiInputs, _requested: &[String]) -> Result<Outputs, OperationError> {
    let product = number(inputs, "a")? * number(inputs, "b")?;
    Ok(Outputs::from([("product".to_string(), Value::Float(product))]))
}
