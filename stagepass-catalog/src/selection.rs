use stagepass_shared::{Concert, ConcertStatus, TicketType, TicketTypeId};

/// Upper bound on tickets of one type per line, regardless of stock
pub const MAX_TICKETS_PER_LINE: u32 = 10;

/// How many tickets of this type may be selected in one go
pub fn max_selectable(ticket_type: &TicketType) -> u32 {
    ticket_type.available_seats.min(MAX_TICKETS_PER_LINE)
}

/// Check a selection against stock and the per-line cap.
///
/// `already_selected` is what the user already holds for the same ticket
/// type (pending plus staged), which counts toward the cap but not against
/// stock, since the booking service has already taken pending seats off it.
pub fn validate_selection(
    concert: &Concert,
    ticket_type: &TicketType,
    quantity: u32,
    already_selected: u32,
) -> Result<(), SelectionError> {
    if quantity == 0 {
        return Err(SelectionError::ZeroQuantity);
    }

    if concert.status == ConcertStatus::SoldOut || !ticket_type.is_available() {
        return Err(SelectionError::SoldOut(ticket_type.id));
    }

    let max = max_selectable(ticket_type);
    if quantity > max {
        return Err(SelectionError::ExceedsAvailable { requested: quantity, max });
    }

    if already_selected.saturating_add(quantity) > MAX_TICKETS_PER_LINE {
        return Err(SelectionError::ExceedsLineCap {
            requested: quantity,
            held: already_selected,
            cap: MAX_TICKETS_PER_LINE,
        });
    }

    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("Quantity must be at least 1")]
    ZeroQuantity,

    #[error("Ticket type {0} is sold out")]
    SoldOut(TicketTypeId),

    #[error("Requested {requested} tickets, at most {max} can be selected")]
    ExceedsAvailable { requested: u32, max: u32 },

    #[error("Requested {requested} tickets with {held} already held, the limit is {cap}")]
    ExceedsLineCap { requested: u32, held: u32, cap: u32 },
}
