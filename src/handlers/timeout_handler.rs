use std::time::{Duration, Instant};

use log::debug;
use tokio::{task::JoinHandle, time};

use crate::handlers::room_handler::{RoomCommand, RoomSender};

/// Fires `QuestionDeadline` for `generation` at `deadline`. The room ignores
/// it if that cycle is already closed, so aborting is an optimisation.
pub fn schedule_question_close(tx: RoomSender, generation: u64, deadline: Instant) -> JoinHandle<()> {
    tokio::spawn(async move {
        time::sleep_until(time::Instant::from_std(deadline)).await;
        if tx
            .unbounded_send(RoomCommand::QuestionDeadline { generation })
            .is_err()
        {
            debug!("Deadline for generation {} fired after room closed", generation);
        }
    })
}

pub fn schedule_player_removal(
    tx: RoomSender,
    nickname: String,
    connection_id: String,
    after: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        time::sleep(after).await;
        if tx
            .unbounded_send(RoomCommand::GraceExpired {
                nickname,
                connection_id,
            })
            .is_err()
        {
            debug!("Grace period ended after room closed");
        }
    })
}

pub fn schedule_room_retirement(tx: RoomSender, epoch: u64, after: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        time::sleep(after).await;
        if tx
            .unbounded_send(RoomCommand::RetirementDue { epoch })
            .is_err()
        {
            debug!("Retirement check fired after room closed");
        }
    })
}
