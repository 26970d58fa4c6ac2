use stagepass_shared::{BookingKey, CartLine, ConcertId, Money, TicketTypeId};

/// Selections that have not been mirrored as pending bookings yet.
///
/// Lines keep insertion order and are unique per `BookingKey`.
#[derive(Debug, Clone, Default)]
pub struct CartStore {
    lines: Vec<CartLine>,
}

impl CartStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge into the line for the same key, or append a new one.
    /// The unit price captured by the first selection is kept.
    pub fn add_line(
        &mut self,
        concert_id: ConcertId,
        ticket_type_id: TicketTypeId,
        quantity: u32,
        unit_price: Money,
    ) -> Result<&CartLine, CartError> {
        if quantity == 0 {
            return Err(CartError::ZeroQuantity);
        }
        if unit_price.is_negative() {
            return Err(CartError::NegativePrice(unit_price));
        }

        let key = BookingKey::new(concert_id, ticket_type_id);
        let index = match self.position(&key) {
            Some(index) => {
                let line = &mut self.lines[index];
                line.quantity = line
                    .quantity
                    .checked_add(quantity)
                    .ok_or(CartError::QuantityOverflow(key))?;
                index
            }
            None => {
                self.lines.push(CartLine::new(concert_id, ticket_type_id, quantity, unit_price));
                self.lines.len() - 1
            }
        };
        Ok(&self.lines[index])
    }

    /// No-op when the key is absent
    pub fn remove_line(&mut self, key: &BookingKey) -> Option<CartLine> {
        self.position(key).map(|index| self.lines.remove(index))
    }

    /// Put a line back to an earlier snapshot; `None` removes it
    pub fn restore(&mut self, key: &BookingKey, previous: Option<CartLine>) {
        match (self.position(key), previous) {
            (Some(index), Some(line)) => self.lines[index] = line,
            (Some(index), None) => {
                self.lines.remove(index);
            }
            (None, Some(line)) => self.lines.push(line),
            (None, None) => {}
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn total_amount(&self) -> Money {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    pub fn line(&self, key: &BookingKey) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.key() == *key)
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn position(&self, key: &BookingKey) -> Option<usize> {
        self.lines.iter().position(|l| l.key() == *key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CartError {
    #[error("Quantity must be at least 1")]
    ZeroQuantity,

    #[error("Unit price cannot be negative: {0}")]
    NegativePrice(Money),

    #[error("Quantity overflow for {0}")]
    QuantityOverflow(BookingKey),
}
