use std::collections::VecDeque;

// 直近capacity件の価格を保持する
#[derive(Debug, Clone)]
pub struct PriceHistory {
    capacity: usize,
    data: VecDeque<f64>,
}

impl PriceHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            data: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, price: f64) {
        if self.capacity == 0 {
            return;
        }
        if self.data.len() == self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(price);
    }

    // 古い順
    pub fn to_vec(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
