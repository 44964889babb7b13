//! Tab navigation across field frames and the merchant's own form controls.

use crate::domain::field::FieldKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Back,
}

/// One element of the merchant document, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentNode {
    HostedField(FieldKey),
    /// A merchant-owned element the customer can focus, by id.
    Focusable(String),
    /// Anything that cannot take focus.
    Inert,
}

/// The merchant form enclosing the hosted fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MerchantForm {
    nodes: Vec<DocumentNode>,
}

impl MerchantForm {
    pub fn new(nodes: Vec<DocumentNode>) -> Self {
        Self { nodes }
    }

    /// Elements that can take focus, in document order.
    pub fn focusable(&self) -> impl Iterator<Item = &DocumentNode> {
        self.nodes
            .iter()
            .filter(|node| !matches!(node, DocumentNode::Inert))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FocusOutcome {
    /// Focus moves into another field frame.
    HostedField(FieldKey),
    /// Focus moves to a merchant element.
    Merchant(String),
    /// No enclosing form: the frame should drop its boundary intercepts.
    RemoveIntercepts,
    /// Nothing focusable in that direction.
    Stay,
}

pub struct FocusNavigator {
    form: Option<MerchantForm>,
}

impl FocusNavigator {
    pub fn new(form: Option<MerchantForm>) -> Self {
        Self { form }
    }

    pub fn navigate(&self, from: FieldKey, direction: Direction) -> FocusOutcome {
        let Some(form) = &self.form else {
            return FocusOutcome::RemoveIntercepts;
        };

        let order: Vec<&DocumentNode> = form.focusable().collect();
        let Some(position) = order
            .iter()
            .position(|node| **node == DocumentNode::HostedField(from))
        else {
            return FocusOutcome::Stay;
        };

        let next = match direction {
            Direction::Forward => order.get(position + 1),
            Direction::Back => position.checked_sub(1).and_then(|index| order.get(index)),
        };
        match next {
            Some(DocumentNode::HostedField(key)) => FocusOutcome::HostedField(*key),
            Some(DocumentNode::Focusable(id)) => FocusOutcome::Merchant(id.clone()),
            Some(DocumentNode::Inert) | None => FocusOutcome::Stay,
        }
    }
}
